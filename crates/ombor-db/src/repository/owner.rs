//! Factory and customer records: the two debt owners.

use ombor_core::{Customer, Factory};

use super::Record;

impl Record for Factory {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl Record for Customer {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}
