use super::types::{Contact, HealthReminder, PensionInfo};

/// Reference data the controller reads at session start
///
/// Contacts and pension info are read-only. Reminders are owned here but only
/// the controller flips `taken`.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    pub contacts: Vec<Contact>,
    pub reminders: Vec<HealthReminder>,
    pub pension: PensionInfo,
}

impl ReferenceData {
    /// The built-in demonstration dataset
    pub fn fixtures() -> Self {
        Self {
            contacts: vec![
                contact("1", "Carlos Quispe", "987654321", "Hijo"),
                contact("2", "María Huamán", "987654322", "Hija"),
                contact("3", "Dr. Pérez", "987654323", "Doctor"),
                contact("4", "Vecina Rosa", "987654324", "Vecina"),
            ],
            reminders: vec![
                reminder("1", "Pastilla para presión", "08:00"),
                reminder("2", "Vitaminas", "12:00"),
                reminder("3", "Pastilla para diabetes", "20:00"),
            ],
            pension: PensionInfo {
                next_payment: "15 de Enero 2025".to_string(),
                amount: "S/ 500.00".to_string(),
                last_payment: "15 de Diciembre 2024".to_string(),
                status: "Activo".to_string(),
                deposit_day: 15,
            },
        }
    }

    pub fn contact(&self, id: &str) -> Option<&Contact> {
        self.contacts.iter().find(|contact| contact.id == id)
    }

    pub fn reminder(&self, id: &str) -> Option<&HealthReminder> {
        self.reminders.iter().find(|reminder| reminder.id == id)
    }

    pub fn reminder_mut(&mut self, id: &str) -> Option<&mut HealthReminder> {
        self.reminders.iter_mut().find(|reminder| reminder.id == id)
    }
}

impl Default for ReferenceData {
    fn default() -> Self {
        Self::fixtures()
    }
}

fn contact(id: &str, name: &str, phone: &str, relationship: &str) -> Contact {
    Contact {
        id: id.to_string(),
        name: name.to_string(),
        phone: phone.to_string(),
        relationship: relationship.to_string(),
    }
}

fn reminder(id: &str, medication: &str, time: &str) -> HealthReminder {
    HealthReminder {
        id: id.to_string(),
        medication: medication.to_string(),
        time: time.to_string(),
        frequency: "Diario".to_string(),
        taken: false,
    }
}
