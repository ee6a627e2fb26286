//! Filter lists: allow/deny lists of DNS match names.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dns::name::{DnsName, MatchName};
use crate::error::Result;

/// Whether a filter list admits matching names or rejects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterAction {
    Allow,
    Deny,
}

/// An ordered list of match names with an allow-or-deny mode.
///
/// The name list is sorted and deduplicated at construction; two lists
/// with the same mode and the same name byte sequences are equal.
#[derive(Debug, PartialEq, Eq)]
pub struct FilterList {
    action: FilterAction,
    names: Vec<MatchName>,
}

impl FilterList {
    /// Build a filter list from raw pattern strings.
    pub fn new(action: FilterAction, patterns: &[String]) -> Result<Self> {
        let mut patterns: Vec<&str> = patterns.iter().map(String::as_str).collect();
        patterns.sort_unstable();
        patterns.dedup();

        let names = patterns
            .iter()
            .map(|p| MatchName::parse(p))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { action, names })
    }

    /// The list mode.
    pub fn action(&self) -> FilterAction {
        self.action
    }

    /// The sorted, deduplicated match names.
    pub fn names(&self) -> &[MatchName] {
        &self.names
    }

    /// Whether this list admits `name`.
    ///
    /// An ALLOW list admits a name iff at least one match name appears as
    /// a contiguous byte subsequence of its label bytes; a DENY list
    /// admits a name iff none does.
    pub fn admits(&self, name: &DnsName) -> bool {
        let matched = self.names.iter().any(|m| name.contains(m));
        match self.action {
            FilterAction::Allow => matched,
            FilterAction::Deny => !matched,
        }
    }
}

/// The inbound filters applicable to one ingress interface.
#[derive(Clone, Copy, Default)]
pub struct InboundFilters<'a> {
    /// The global filter list, if configured.
    pub global: Option<&'a FilterList>,
    /// The ingress interface's inbound list, if configured.
    pub interface: Option<&'a FilterList>,
}

impl InboundFilters<'_> {
    /// Whether both applicable lists admit `name`.
    pub fn admits(&self, name: &DnsName) -> bool {
        self.global.is_none_or(|list| list.admits(name))
            && self.interface.is_none_or(|list| list.admits(name))
    }
}

/// Whether an outbound list admits `name`. A missing list admits all.
pub fn allowed_outbound(list: Option<&FilterList>, name: &DnsName) -> bool {
    list.is_none_or(|list| list.admits(name))
}

/// Intern `list` into `pool`: equal lists adopt a single shared instance
/// so the bridge loop can deduplicate outbound variants by identity.
pub fn intern(list: FilterList, pool: &mut Vec<Arc<FilterList>>) -> Arc<FilterList> {
    if let Some(existing) = pool.iter().find(|shared| ***shared == list) {
        return Arc::clone(existing);
    }
    let shared = Arc::new(list);
    pool.push(Arc::clone(&shared));
    shared
}

/// Intern an interface inbound list, eliding it when it duplicates the
/// global list (the global already covers it).
pub fn intern_inbound(
    interface_name: &str,
    list: FilterList,
    global: Option<&Arc<FilterList>>,
    pool: &mut Vec<Arc<FilterList>>,
) -> Option<Arc<FilterList>> {
    if let Some(global) = global {
        if **global == list {
            info!(
                "Interface {} inbound filter discarded (duplicate of the global filter)",
                interface_name
            );
            return None;
        }
    }
    Some(intern(list, pool))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(dotted: &str) -> DnsName {
        let mut wire = Vec::new();
        for label in dotted.split('.') {
            wire.push(label.len() as u8);
            wire.extend_from_slice(label.as_bytes());
        }
        wire.push(0);
        let mut name = DnsName::default();
        name.read(&wire, 0).unwrap();
        name
    }

    fn list(action: FilterAction, patterns: &[&str]) -> FilterList {
        let patterns: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        FilterList::new(action, &patterns).unwrap()
    }

    #[test]
    fn test_names_sorted_and_deduplicated() {
        let l = list(FilterAction::Allow, &["_ssh", "_ipp", "_ssh", "_airplay"]);
        let names: Vec<String> = l.names().iter().map(|n| n.to_string()).collect();
        assert_eq!(names, vec!["_airplay", "_ipp", "_ssh"]);
    }

    #[test]
    fn test_allow_list_admits_on_match() {
        let l = list(FilterAction::Allow, &["_ipp"]);
        assert!(l.admits(&name("Office._ipp._tcp.local")));
        assert!(!l.admits(&name("Laptop._ssh._tcp.local")));
    }

    #[test]
    fn test_deny_list_admits_on_no_match() {
        let l = list(FilterAction::Deny, &["_ssh"]);
        assert!(l.admits(&name("Office._ipp._tcp.local")));
        assert!(!l.admits(&name("Laptop._ssh._tcp.local")));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let patterns = vec!["good".to_string(), "bad..name".to_string()];
        assert!(FilterList::new(FilterAction::Allow, &patterns).is_err());
    }

    #[test]
    fn test_inbound_conjunction() {
        let global = list(FilterAction::Allow, &["_tcp"]);
        let iface = list(FilterAction::Deny, &["_ssh"]);

        let filters = InboundFilters {
            global: Some(&global),
            interface: Some(&iface),
        };
        // Admitted by global, rejected by interface.
        assert!(!filters.admits(&name("Laptop._ssh._tcp.local")));
        // Admitted by both.
        assert!(filters.admits(&name("Office._ipp._tcp.local")));
        // Rejected by global, admitted by interface.
        assert!(!filters.admits(&name("host._ipp._udp.local")));
    }

    #[test]
    fn test_inbound_order_independent() {
        let a = list(FilterAction::Allow, &["_tcp"]);
        let b = list(FilterAction::Deny, &["_ssh"]);
        let names = [
            name("Laptop._ssh._tcp.local"),
            name("Office._ipp._tcp.local"),
            name("host._ipp._udp.local"),
        ];
        for n in &names {
            let ab = InboundFilters {
                global: Some(&a),
                interface: Some(&b),
            };
            let ba = InboundFilters {
                global: Some(&b),
                interface: Some(&a),
            };
            assert_eq!(ab.admits(n), ba.admits(n));
        }
    }

    #[test]
    fn test_inbound_none_admits_all() {
        let filters = InboundFilters::default();
        assert!(filters.admits(&name("anything.local")));
    }

    #[test]
    fn test_outbound_none_admits_all() {
        assert!(allowed_outbound(None, &name("anything.local")));
        let l = list(FilterAction::Deny, &["anything"]);
        assert!(!allowed_outbound(Some(&l), &name("anything.local")));
    }

    #[test]
    fn test_filter_list_equality() {
        let a = list(FilterAction::Allow, &["_ipp", "_ssh"]);
        let b = list(FilterAction::Allow, &["_ssh", "_ipp"]);
        let c = list(FilterAction::Deny, &["_ipp", "_ssh"]);
        let d = list(FilterAction::Allow, &["_ipp"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_intern_shares_equal_lists() {
        let mut pool = Vec::new();
        let a = intern(list(FilterAction::Deny, &["_ssh"]), &mut pool);
        let b = intern(list(FilterAction::Deny, &["_ssh"]), &mut pool);
        let c = intern(list(FilterAction::Deny, &["_ipp"]), &mut pool);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_intern_inbound_elides_global_duplicate() {
        let global = Arc::new(list(FilterAction::Allow, &["_ipp"]));
        let mut pool = Vec::new();

        let elided = intern_inbound(
            "eth0",
            list(FilterAction::Allow, &["_ipp"]),
            Some(&global),
            &mut pool,
        );
        assert!(elided.is_none());
        assert!(pool.is_empty());

        let kept = intern_inbound(
            "eth1",
            list(FilterAction::Deny, &["_ipp"]),
            Some(&global),
            &mut pool,
        );
        assert!(kept.is_some());
        assert_eq!(pool.len(), 1);
    }
}
