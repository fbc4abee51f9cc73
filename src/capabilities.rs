//! Capability names advertised by the server and the subset requested by the caller.

use serde::Serialize;

/// Static and virtual capability names known to the server.
///
/// Both lists are sorted once at construction so membership tests are a
/// binary search.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    static_caps: Vec<String>,
    virtual_caps: Vec<String>,
}

impl CapabilityRegistry {
    pub fn new(mut static_caps: Vec<String>, mut virtual_caps: Vec<String>) -> Self {
        static_caps.sort();
        static_caps.dedup();
        virtual_caps.sort();
        virtual_caps.dedup();
        Self {
            static_caps,
            virtual_caps,
        }
    }

    pub fn has_static(&self, name: &str) -> bool {
        contains_sorted(&self.static_caps, name)
    }

    pub fn has_virtual(&self, name: &str) -> bool {
        contains_sorted(&self.virtual_caps, name)
    }

    pub fn static_caps(&self) -> &[String] {
        &self.static_caps
    }

    pub fn virtual_caps(&self) -> &[String] {
        &self.virtual_caps
    }

    /// Keep only the names that are static capabilities
    pub fn filter_static<I, S>(&self, names: I) -> Filtered
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.filter_by(names, |name| self.has_static(name))
    }

    /// Keep only the names that are virtual capabilities
    pub fn filter_virtual<I, S>(&self, names: I) -> Filtered
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.filter_by(names, |name| self.has_virtual(name))
    }

    /// Split names into static and virtual sets. A name known as both goes to static.
    pub fn split<I, S>(&self, names: I) -> (Filtered, Vec<String>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut statics = Filtered::default();
        let mut virtuals = Vec::new();
        for name in names {
            let name = name.as_ref();
            if self.has_static(name) {
                statics.accepted.push(name.to_string());
            } else if self.has_virtual(name) {
                virtuals.push(name.to_string());
            } else {
                statics.rejected += 1;
            }
        }
        (statics, virtuals)
    }

    fn filter_by<I, S>(&self, names: I, known: impl Fn(&str) -> bool) -> Filtered
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Filtered::default();
        for name in names {
            let name = name.as_ref();
            if known(name) {
                out.accepted.push(name.to_string());
            } else {
                out.rejected += 1;
            }
        }
        out
    }
}

fn contains_sorted(list: &[String], name: &str) -> bool {
    list.binary_search_by(|probe| probe.as_str().cmp(name)).is_ok()
}

/// Result of filtering a list of names against the registry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filtered {
    pub accepted: Vec<String>,
    pub rejected: usize,
}

/// Capability names sent along with every lookup.
///
/// Empty lists mean "return every capability".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestedCapabilities {
    pub static_caps: Vec<String>,
    pub virtual_caps: Vec<String>,
}

/// Outcome of a requested-capabilities update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedUpdate {
    /// Requested set reset to all capabilities, caches cleared
    Cleared,
    /// Filtered names committed, caches cleared
    Committed { accepted: usize, rejected: usize },
    /// Nothing valid left after filtering; previous set and caches untouched
    Ignored { rejected: usize },
}

impl RequestedUpdate {
    /// Whether the update cleared the caches
    pub fn invalidated(&self) -> bool {
        !matches!(self, RequestedUpdate::Ignored { .. })
    }
}
