//! Types for representing the hosts netpilot manages, and a loader for the `SimpleInventory`
//! YAML format.
//!
//! An inventory is three files:
//!
//! ```yaml
//! # hosts.yaml
//! veos01:
//!   hostname: 10.254.169.50
//!   groups:
//!     - arista_eapi
//!
//! # groups.yaml
//! arista_eapi: { platform: eos, port: 443 }
//!
//! # defaults.yaml
//! username: admin
//! password: password
//! ```
//!
//! Connection parameters resolve from the most specific place they are set: the host itself, then
//! its groups in the order listed (depth-first through each group's own parent groups), then the
//! defaults.

use crate::config::SimpleInventoryOptions;
use anyhow::{anyhow, bail, Context};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

/// What [Host::to_dict] and friends show instead of a password.
const MASKED_PASSWORD: &str = "********";

/// Free-form, user-defined data attached to a host, group, or the defaults.
pub type Data = IndexMap<String, Value>;

/// The connection parameters that hosts, groups, and defaults can each set or leave unset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionParams {
    pub hostname: Option<String>,
    pub platform: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ConnectionParams {
    fn to_dict(&self) -> Value {
        json!({
            "hostname": self.hostname,
            "platform": self.platform,
            "port": self.port,
            "username": self.username,
            "password": self.password.as_ref().map(|_| MASKED_PASSWORD),
        })
    }
}

/// Process-wide fallback values for any host or group lacking an explicit setting.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Defaults {
    #[serde(flatten)]
    pub params: ConnectionParams,
    pub data: Data,
}

impl Defaults {
    /// A JSON view of the defaults for diagnostics. The password is masked.
    pub fn to_dict(&self) -> Value {
        let mut dict = self.params.to_dict();
        dict["data"] = json!(self.data);
        dict
    }
}

/// A named bundle of connection parameters shared by reference across hosts.
#[derive(Clone, Debug, PartialEq)]
pub struct Group {
    pub name: String,
    pub params: ConnectionParams,
    pub data: Data,

    /// Parent groups, in the order listed.
    pub groups: Vec<Arc<Group>>,
}

impl Group {
    /// Depth-first lookup through this group and its parents.
    fn resolve<'a, T>(&'a self, field: &impl Fn(&'a ConnectionParams) -> Option<T>) -> Option<T> {
        field(&self.params).or_else(|| self.groups.iter().find_map(|g| g.resolve(field)))
    }

    fn resolve_data(&self, key: &str) -> Option<&Value> {
        self.data
            .get(key)
            .or_else(|| self.groups.iter().find_map(|g| g.resolve_data(key)))
    }

    /// A JSON view of the group for diagnostics. The password is masked.
    pub fn to_dict(&self) -> Value {
        let mut dict = self.params.to_dict();
        dict["name"] = json!(self.name);
        dict["groups"] = json!(self.groups.iter().map(|g| &g.name).collect::<Vec<_>>());
        dict["data"] = json!(self.data);
        dict
    }
}

/// A managed network device.
///
/// Immutable once loaded. Accessors return the effective value after resolving through groups and
/// defaults; the raw, host-level values are in [Self::params] and [Self::data].
#[derive(Clone, Debug, PartialEq)]
pub struct Host {
    pub name: String,
    pub params: ConnectionParams,
    pub data: Data,
    pub groups: Vec<Arc<Group>>,
    pub defaults: Arc<Defaults>,
}

impl Host {
    /// The names of the values [Self::to_dict] reports.
    pub const FIELDS: &'static [&'static str] = &[
        "name", "hostname", "groups", "platform", "port", "username", "password", "data",
    ];

    fn resolve<'a, T>(&'a self, field: impl Fn(&'a ConnectionParams) -> Option<T>) -> Option<T> {
        field(&self.params)
            .or_else(|| self.groups.iter().find_map(|g| g.resolve(&field)))
            .or_else(|| field(&self.defaults.params))
    }

    /// The address to connect to. Falls back to the host's name.
    pub fn hostname(&self) -> &str {
        self.resolve(|p| p.hostname.as_deref())
            .unwrap_or(&self.name)
    }

    pub fn platform(&self) -> Option<&str> {
        self.resolve(|p| p.platform.as_deref())
    }

    pub fn port(&self) -> Option<u16> {
        self.resolve(|p| p.port)
    }

    pub fn username(&self) -> Option<&str> {
        self.resolve(|p| p.username.as_deref())
    }

    pub fn password(&self) -> Option<&str> {
        self.resolve(|p| p.password.as_deref())
    }

    /// Looks up a data key on the host, then its groups, then the defaults.
    pub fn data(&self, key: &str) -> Option<&Value> {
        self.data
            .get(key)
            .or_else(|| self.groups.iter().find_map(|g| g.resolve_data(key)))
            .or_else(|| self.defaults.data.get(key))
    }

    /// Returns `true` if the host belongs to `group`, directly or through a parent group.
    pub fn has_group(&self, group: &str) -> bool {
        fn contains(groups: &[Arc<Group>], name: &str) -> bool {
            groups
                .iter()
                .any(|g| g.name == name || contains(&g.groups, name))
        }
        contains(&self.groups, group)
    }

    /// A JSON view of the host's effective values for diagnostics. The password is masked.
    pub fn to_dict(&self) -> Value {
        json!({
            "name": self.name,
            "hostname": self.hostname(),
            "groups": self.groups.iter().map(|g| &g.name).collect::<Vec<_>>(),
            "platform": self.platform(),
            "port": self.port(),
            "username": self.username(),
            "password": self.password().map(|_| MASKED_PASSWORD),
            "data": self.data,
        })
    }
}

/// The on-disk form of a host or group entry.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
struct Entry {
    #[serde(flatten)]
    params: ConnectionParams,
    groups: Vec<String>,
    data: Data,
}

/// The full set of hosts, groups, and defaults for a run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Inventory {
    hosts: IndexMap<String, Arc<Host>>,
    groups: IndexMap<String, Arc<Group>>,
    defaults: Arc<Defaults>,
}

impl Inventory {
    /// Loads an inventory from the files named in `options`.
    ///
    /// The hosts file must exist. A missing groups or defaults file is treated as empty.
    pub fn load(options: &SimpleInventoryOptions) -> anyhow::Result<Self> {
        let hosts = fs::read_to_string(&options.host_file)
            .with_context(|| format!("failed to read {}", options.host_file.display()))?;
        let groups = read_optional(&options.group_file)?;
        let defaults = read_optional(&options.defaults_file)?;

        Self::from_yaml(&hosts, &groups, &defaults).with_context(|| {
            format!(
                "failed to load inventory from {}, {}, and {}",
                options.host_file.display(),
                options.group_file.display(),
                options.defaults_file.display(),
            )
        })
    }

    /// Builds an inventory from the contents of the three YAML files.
    pub fn from_yaml(hosts: &str, groups: &str, defaults: &str) -> anyhow::Result<Self> {
        let host_entries: IndexMap<String, Entry> =
            parse_yaml(hosts).context("failed to parse hosts")?;
        let group_entries: IndexMap<String, Entry> =
            parse_yaml(groups).context("failed to parse groups")?;
        let defaults: Arc<Defaults> =
            Arc::new(parse_yaml(defaults).context("failed to parse defaults")?);

        let mut groups = IndexMap::new();
        for name in group_entries.keys() {
            build_group(name, &group_entries, &mut groups, &mut Vec::new())?;
        }

        let mut hosts = IndexMap::new();
        for (name, entry) in host_entries {
            let member_of = entry
                .groups
                .iter()
                .map(|group| {
                    groups.get(group).cloned().ok_or_else(|| {
                        anyhow!("host \"{name}\" refers to unknown group \"{group}\"")
                    })
                })
                .collect::<anyhow::Result<Vec<_>>>()?;

            let host = Host {
                name: name.clone(),
                params: entry.params,
                data: entry.data,
                groups: member_of,
                defaults: defaults.clone(),
            };
            hosts.insert(name, Arc::new(host));
        }

        // Keep the file's order rather than the order in which parents happened to be resolved.
        let groups = group_entries
            .keys()
            .filter_map(|name| groups.get_key_value(name))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            hosts,
            groups,
            defaults,
        })
    }

    /// Iterates over hosts in the order they appear in the hosts file.
    pub fn hosts(&self) -> impl Iterator<Item = &Arc<Host>> {
        self.hosts.values()
    }

    pub fn host(&self, name: &str) -> Option<&Arc<Host>> {
        self.hosts.get(name)
    }

    pub fn groups(&self) -> impl Iterator<Item = &Arc<Group>> {
        self.groups.values()
    }

    pub fn group(&self, name: &str) -> Option<&Arc<Group>> {
        self.groups.get(name)
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Returns an inventory holding only the hosts for which `predicate` returns `true`.
    ///
    /// Groups and defaults are shared with `self`.
    pub fn filter(&self, predicate: impl Fn(&Host) -> bool) -> Self {
        Self {
            hosts: self
                .hosts
                .iter()
                .filter(|(_, host)| predicate(host))
                .map(|(name, host)| (name.clone(), host.clone()))
                .collect(),
            groups: self.groups.clone(),
            defaults: self.defaults.clone(),
        }
    }
}

/// Reads a file that is allowed to be missing. A missing file reads as empty.
fn read_optional(path: &Path) -> anyhow::Result<String> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(contents),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

/// Parses YAML, treating an empty or null document as the type's default.
fn parse_yaml<T: DeserializeOwned + Default>(yaml: &str) -> anyhow::Result<T> {
    if yaml.trim().is_empty() {
        return Ok(T::default());
    }
    let parsed: Option<T> = serde_yaml::from_str(yaml)?;
    Ok(parsed.unwrap_or_default())
}

/// Builds the group `name` and, first, any parent groups it refers to. `path` holds the chain of
/// groups currently being built and is used to detect cycles.
fn build_group(
    name: &str,
    entries: &IndexMap<String, Entry>,
    built: &mut IndexMap<String, Arc<Group>>,
    path: &mut Vec<String>,
) -> anyhow::Result<Arc<Group>> {
    if let Some(group) = built.get(name) {
        return Ok(group.clone());
    }
    if path.iter().any(|p| p == name) {
        bail!("group \"{name}\" is its own parent: {} -> {name}", path.join(" -> "));
    }
    let entry = match entries.get(name) {
        Some(entry) => entry,
        None => match path.last() {
            Some(child) => bail!("group \"{child}\" refers to unknown group \"{name}\""),
            None => bail!("unknown group \"{name}\""),
        },
    };

    path.push(name.to_string());
    let parents = entry
        .groups
        .iter()
        .map(|parent| build_group(parent, entries, built, path))
        .collect::<anyhow::Result<Vec<_>>>()?;
    path.pop();

    let group = Arc::new(Group {
        name: name.to_string(),
        params: entry.params.clone(),
        data: entry.data.clone(),
        groups: parents,
    });
    built.insert(name.to_string(), group.clone());
    Ok(group)
}
