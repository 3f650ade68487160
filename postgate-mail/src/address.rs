use std::fmt;

use mail_parser::{Addr, Address as HeaderAddress};

/// A mailbox, with its display name when the header carried one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Address {
    pub name: String,
    pub address: String,
}

impl Address {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    pub fn bare(address: impl Into<String>) -> Self {
        Self::new(String::new(), address)
    }

    fn from_record(record: &Addr<'_>) -> Self {
        Self {
            name: record.name.as_deref().unwrap_or_default().trim().to_string(),
            address: record
                .address
                .as_deref()
                .unwrap_or_default()
                .trim()
                .to_string(),
        }
    }
}

/// `Name <address>`, or the bare address when there is no name.
impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name.is_empty() {
            true => write!(f, "{}", self.address),
            false => write!(f, "{} <{}>", self.name, self.address),
        }
    }
}

/// One `Address` per record, same order. Never fails: records the parser
/// let through are kept as is, a missing part becomes an empty string.
pub fn normalize<'a, 'x: 'a>(records: impl IntoIterator<Item = &'a Addr<'x>>) -> Vec<Address> {
    records.into_iter().map(Address::from_record).collect()
}

/// Normalize an address header, group members are flattened in order.
pub fn from_header(header: Option<&HeaderAddress<'_>>) -> Vec<Address> {
    match header {
        None => vec![],
        Some(HeaderAddress::List(list)) => normalize(list),
        Some(HeaderAddress::Group(groups)) => {
            normalize(groups.iter().flat_map(|group| group.addresses.iter()))
        }
    }
}
