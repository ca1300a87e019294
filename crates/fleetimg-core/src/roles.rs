// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FleetImg.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Role catalog collaborator

use std::collections::BTreeSet;
use std::fmt;

/// Answers whether an element role is known to the inventory
pub trait RoleCatalog: Send + Sync + fmt::Debug {
    fn role_exists(&self, role: &str) -> bool;
}

/// Fixed set of role names, typically loaded from configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticRoleCatalog {
    roles: BTreeSet<String>,
}

impl StaticRoleCatalog {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(String::as_str)
    }
}

impl RoleCatalog for StaticRoleCatalog {
    fn role_exists(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_catalog_lookup() {
        let catalog = StaticRoleCatalog::new(["SPINE", "LEAF"]);
        assert!(catalog.role_exists("SPINE"));
        assert!(!catalog.role_exists("spine"));
        assert!(!catalog.role_exists("BORDER"));
        assert_eq!(catalog.roles().count(), 2);
    }
}
