use serde::{Deserialize, Serialize};

// Item stored and served by the API
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    pub name: String,
}

impl Item {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
