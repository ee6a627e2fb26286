//! Bridge configuration: YAML loading, validation, and construction of
//! the interface table with interned filter lists.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::filter::{intern, intern_inbound, FilterAction, FilterList};
use crate::net::interface::{Interface, IpFamily};

/// Top-level configuration file contents.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Interfaces to bridge (minimum 2 required).
    pub interfaces: Vec<String>,

    /// Disable IPv4 bridging on every interface.
    #[serde(default)]
    pub disable_ipv4: bool,

    /// Disable IPv6 bridging on every interface.
    #[serde(default)]
    pub disable_ipv6: bool,

    /// Disable packet filtering entirely: received datagrams are
    /// forwarded without being decoded.
    #[serde(default)]
    pub disable_filtering: bool,

    /// Global allow list, applied inbound on every interface.
    #[serde(default)]
    pub allow_filters: Vec<String>,

    /// Global deny list, exclusive with `allow_filters`.
    #[serde(default)]
    pub deny_filters: Vec<String>,

    /// Per-interface settings, keyed by interface name.
    #[serde(default)]
    pub interface_config: HashMap<String, InterfaceConfig>,
}

/// Per-interface configuration section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceConfig {
    /// Override the global IPv4 setting. Re-enabling a globally
    /// disabled family is an error.
    #[serde(default)]
    pub disable_ipv4: Option<bool>,

    /// Override the global IPv6 setting.
    #[serde(default)]
    pub disable_ipv6: Option<bool>,

    /// Inbound allow list.
    #[serde(default)]
    pub allow_inbound: Vec<String>,

    /// Inbound deny list, exclusive with `allow_inbound`.
    #[serde(default)]
    pub deny_inbound: Vec<String>,

    /// Outbound allow list.
    #[serde(default)]
    pub allow_outbound: Vec<String>,

    /// Outbound deny list, exclusive with `allow_outbound`.
    #[serde(default)]
    pub deny_outbound: Vec<String>,
}

/// A validated configuration: the interface table with interned filter
/// lists, ready for OS validation and socket binding.
pub struct ResolvedConfig {
    pub interfaces: Vec<Interface>,
    pub global_filter: Option<Arc<FilterList>>,
    pub filtering_enabled: bool,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Pick at most one of an allow/deny list pair.
    fn action_list<'a>(
        allow: &'a [String],
        deny: &'a [String],
        what: &str,
    ) -> Result<Option<(FilterAction, &'a [String])>> {
        match (allow.is_empty(), deny.is_empty()) {
            (false, false) => Err(Error::Config(format!(
                "only one {} list is allowed",
                what
            ))),
            (false, true) => Ok(Some((FilterAction::Allow, allow))),
            (true, false) => Ok(Some((FilterAction::Deny, deny))),
            (true, true) => Ok(None),
        }
    }

    /// Validate the configuration and build the interface table.
    pub fn resolve(self) -> Result<ResolvedConfig> {
        if self.interfaces.len() < 2 {
            return Err(Error::Config(
                "a minimum of 2 interfaces are required".to_string(),
            ));
        }
        for (index, name) in self.interfaces.iter().enumerate() {
            if self.interfaces[..index].contains(name) {
                return Err(Error::Config(format!(
                    "interface \"{}\" is listed more than once",
                    name
                )));
            }
        }

        let filtering_enabled = !self.disable_filtering;
        let has_interface_filters = self.interface_config.values().any(|c| {
            !c.allow_inbound.is_empty()
                || !c.deny_inbound.is_empty()
                || !c.allow_outbound.is_empty()
                || !c.deny_outbound.is_empty()
        });
        let has_global_filters = !self.allow_filters.is_empty() || !self.deny_filters.is_empty();
        if !filtering_enabled && (has_global_filters || has_interface_filters) {
            return Err(Error::Config(
                "filter lists cannot be combined with disable_filtering".to_string(),
            ));
        }

        let global_filter =
            Self::action_list(&self.allow_filters, &self.deny_filters, "global filter")?
                .map(|(action, patterns)| FilterList::new(action, patterns).map(Arc::new))
                .transpose()?;

        let mut interfaces: Vec<Interface> = self
            .interfaces
            .iter()
            .map(|name| {
                let mut interface = Interface::new(name);
                interface.disabled = [self.disable_ipv4, self.disable_ipv6];
                interface
            })
            .collect();

        let mut inbound_pool: Vec<Arc<FilterList>> = Vec::new();
        let mut outbound_pool: Vec<Arc<FilterList>> = Vec::new();

        if let Some(name) = self
            .interface_config
            .keys()
            .filter(|name| !self.interfaces.contains(name))
            .min()
        {
            return Err(Error::Config(format!(
                "interface \"{}\" is not in the interfaces list",
                name
            )));
        }

        // Process sections in declared interface order so filter
        // interning and error reporting are deterministic.
        for (index, name) in self.interfaces.iter().enumerate() {
            let Some(section) = self.interface_config.get(name) else {
                continue;
            };

            for (family, global_disable, setting) in [
                (IpFamily::V4, self.disable_ipv4, section.disable_ipv4),
                (IpFamily::V6, self.disable_ipv6, section.disable_ipv6),
            ] {
                match setting {
                    Some(true) => interfaces[index].disabled[family.index()] = true,
                    Some(false) if global_disable => {
                        return Err(Error::Config(format!(
                            "{} is globally disabled",
                            family
                        )));
                    }
                    Some(false) | None => {}
                }
            }

            if let Some((action, patterns)) = Self::action_list(
                &section.allow_inbound,
                &section.deny_inbound,
                "inbound filter per interface",
            )? {
                let list = FilterList::new(action, patterns)?;
                interfaces[index].inbound_filter =
                    intern_inbound(name, list, global_filter.as_ref(), &mut inbound_pool);
            }

            if let Some((action, patterns)) = Self::action_list(
                &section.allow_outbound,
                &section.deny_outbound,
                "outbound filter per interface",
            )? {
                let list = FilterList::new(action, patterns)?;
                interfaces[index].outbound_filter = Some(intern(list, &mut outbound_pool));
            }
        }

        Ok(ResolvedConfig {
            interfaces,
            global_filter,
            filtering_enabled,
        })
    }
}
