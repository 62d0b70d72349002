use std::collections::BTreeMap;

/// The value stored under one key.
pub type Record = BTreeMap<String, String>;

/// A small key/value store of a device.
///
/// Programs use it to keep configuration such as leases or names across invocations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Store {
    records: BTreeMap<String, Record>,
}

impl Store {
    /// Get the record of a key.
    pub fn get(&self, key: &str) -> Option<&Record> {
        self.records.get(key)
    }

    /// Replace the record of a key, returning the previous one.
    pub fn set(&mut self, key: &str, record: Record) -> Option<Record> {
        self.records.insert(key.to_owned(), record)
    }

    /// Remove a key.
    pub fn delete(&mut self, key: &str) -> Option<Record> {
        self.records.remove(key)
    }

    /// All keys in order.
    pub fn keys(&self) -> impl Iterator<Item=&str> + '_ {
        self.records.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn set_get_delete() {
        let mut store = Store::default();
        let mut record = Record::new();
        record.insert("lease".into(), "10.0.0.7".into());

        assert_eq!(store.set("dhcp", record.clone()), None);
        assert_eq!(store.get("dhcp"), Some(&record));
        assert_eq!(store.keys().collect::<Vec<_>>(), vec!["dhcp"]);
        assert_eq!(store.delete("dhcp"), Some(record));
        assert_eq!(store.get("dhcp"), None);
        assert_eq!(store.delete("dhcp"), None);
    }
}
