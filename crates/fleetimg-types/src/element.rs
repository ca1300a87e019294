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

//! Managed elements and the images installed on them

use crate::image::{Image, ImageId, ImageState};
use crate::version::{UpdateClass, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque identity of a managed element, owned by the element inventory
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(String);

impl ElementId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ElementId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

/// Element record as supplied by the element identity provider.
///
/// Role and chipset are optional context used to disambiguate image lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRef {
    pub element_id: ElementId,
    #[serde(default)]
    pub element_role: Option<String>,
    #[serde(default)]
    pub platform_chipset: Option<String>,
}

impl ElementRef {
    pub fn new(element_id: impl Into<String>) -> Self {
        Self {
            element_id: ElementId::new(element_id),
            element_role: None,
            platform_chipset: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.element_role = Some(role.into());
        self
    }

    pub fn with_chipset(mut self, chipset: impl Into<String>) -> Self {
        self.platform_chipset = Some(chipset.into());
        self
    }
}

/// Installation state of an image on an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstallState {
    Active,
    Cached,
}

impl InstallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Cached => "CACHED",
        }
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstallState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(Self::Active),
            "CACHED" => Ok(Self::Cached),
            _ => Err(format!("unknown install state '{s}'")),
        }
    }
}

/// Persisted binding between an element and an image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementImage {
    pub binding_id: i64,
    pub element_id: ElementId,
    pub image_id: ImageId,
    pub install_state: InstallState,
    pub installed_at: DateTime<Utc>,
}

/// An image an element reports as installed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledImageRef {
    pub image_type: String,
    pub image_name: String,
    pub image_version: Version,
    pub image_state: InstallState,
    #[serde(default)]
    pub image_id: Option<ImageId>,
}

impl InstalledImageRef {
    pub fn new(
        image_type: impl Into<String>,
        image_name: impl Into<String>,
        image_version: Version,
        image_state: InstallState,
    ) -> Self {
        Self {
            image_type: image_type.into(),
            image_name: image_name.into(),
            image_version,
            image_state,
            image_id: None,
        }
    }

    pub fn active(image_type: &str, image_name: &str, image_version: Version) -> Self {
        Self::new(image_type, image_name, image_version, InstallState::Active)
    }

    pub fn cached(image_type: &str, image_name: &str, image_version: Version) -> Self {
        Self::new(image_type, image_name, image_version, InstallState::Cached)
    }

    pub fn with_image_id(mut self, image_id: ImageId) -> Self {
        self.image_id = Some(image_id);
        self
    }
}

/// A newer image available for an installed one. Derived on read, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementAvailableUpdate {
    pub image_id: ImageId,
    pub image_version: Version,
    pub update_class: UpdateClass,
    pub image_state: ImageState,
    pub build_date: Option<DateTime<Utc>>,
}

/// Installed image of an element together with its available updates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledImage {
    pub element_id: ElementId,
    pub image: Image,
    pub install_state: InstallState,
    pub installed_at: DateTime<Utc>,
    pub available_updates: Vec<ElementAvailableUpdate>,
}
