// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory plugin table.
//!
//! Seeded from the `--plugins` file and updated through the registration
//! endpoints. The dispatcher only ever reads it.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::plugin::{PluginInfo, PluginRegistry};

#[derive(Default)]
pub struct PluginTable {
    plugins: RwLock<HashMap<String, PluginInfo>>,
}

impl PluginTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_plugins(plugins: impl IntoIterator<Item = PluginInfo>) -> Self {
        let table = Self::new();
        for plugin in plugins {
            table.register(plugin);
        }
        table
    }

    /// Register or replace a plugin. Returns true if the service id is new.
    pub fn register(&self, plugin: PluginInfo) -> bool {
        let address = plugin.address.trim_end_matches('/').to_owned();
        let plugin = PluginInfo { address, ..plugin };
        self.plugins.write().insert(plugin.service_id.clone(), plugin).is_none()
    }

    pub fn deregister(&self, service_id: &str) -> bool {
        self.plugins.write().remove(service_id).is_some()
    }

    /// Snapshot of all plugins, sorted by service id.
    pub fn list(&self) -> Vec<PluginInfo> {
        let mut list: Vec<PluginInfo> = self.plugins.read().values().cloned().collect();
        list.sort_by(|a, b| a.service_id.cmp(&b.service_id));
        list
    }

    pub fn len(&self) -> usize {
        self.plugins.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PluginRegistry for PluginTable {
    fn find(&self, service_id: &str) -> Option<PluginInfo> {
        self.plugins.read().get(service_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin(service_id: &str, address: &str) -> PluginInfo {
        PluginInfo {
            service_id: service_id.to_owned(),
            name: String::new(),
            address: address.to_owned(),
            profiles: vec![],
        }
    }

    #[test]
    fn register_new_plugin() {
        let table = PluginTable::new();
        assert!(table.register(plugin("s1", "http://10.0.0.1:4035")));
        assert!(!table.register(plugin("s1", "http://10.0.0.1:4035"))); // re-register
        assert_eq!(table.len(), 1);
        assert!(table.find("s1").is_some());
    }

    #[test]
    fn re_register_replaces_address() {
        let table = PluginTable::new();
        table.register(plugin("s1", "http://old:4035"));
        table.register(plugin("s1", "http://new:4035/"));
        assert_eq!(table.find("s1").map(|p| p.address), Some("http://new:4035".to_owned()));
    }

    #[test]
    fn deregister_removes_plugin() {
        let table = PluginTable::from_plugins([plugin("s1", "http://a"), plugin("s2", "http://b")]);
        assert!(table.deregister("s1"));
        assert!(!table.deregister("s1")); // already gone
        assert!(table.find("s1").is_none());
        assert_eq!(table.list().len(), 1);
    }

    #[test]
    fn list_is_sorted() {
        let table = PluginTable::from_plugins([plugin("b", "http://b"), plugin("a", "http://a")]);
        let ids: Vec<String> = table.list().into_iter().map(|p| p.service_id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
