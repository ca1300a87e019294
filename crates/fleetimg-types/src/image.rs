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

//! Image records, submissions and lifecycle states

use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid image id '{0}'")]
pub struct ImageIdParseError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown image state '{0}'")]
pub struct ImageStateParseError(pub String);

/// Opaque image identity, assigned once and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(Uuid);

impl ImageId {
    /// Generate a fresh random image id
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for ImageId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ImageId {
    type Err = ImageIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| ImageIdParseError(s.to_owned()))
    }
}

/// Lifecycle state of an image.
///
/// ```text
/// NEW ──► CANDIDATE ──► RELEASE ──► SUPERSEDED
///   └──────────┴───────────────────────┴──► REVOKED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImageState {
    New,
    #[default]
    Candidate,
    Release,
    Superseded,
    Revoked,
}

impl ImageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Candidate => "CANDIDATE",
            Self::Release => "RELEASE",
            Self::Superseded => "SUPERSEDED",
            Self::Revoked => "REVOKED",
        }
    }

    pub fn all() -> &'static [ImageState] {
        &[
            Self::New,
            Self::Candidate,
            Self::Release,
            Self::Superseded,
            Self::Revoked,
        ]
    }

    /// Whether `updateImageState` may move an image from `self` to `next`.
    ///
    /// NEW is only ever an initial state and a released image has to be
    /// demoted before it can be revoked. Re-setting the current state is
    /// treated as a no-op by the lifecycle manager and is not a transition.
    pub fn can_transition_to(&self, next: ImageState) -> bool {
        match (self, next) {
            (_, Self::New) => false,
            (Self::Release, Self::Revoked) => false,
            (current, next) => *current != next,
        }
    }
}

impl fmt::Display for ImageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageState {
    type Err = ImageStateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEW" => Ok(Self::New),
            "CANDIDATE" => Ok(Self::Candidate),
            "RELEASE" => Ok(Self::Release),
            "SUPERSEDED" => Ok(Self::Superseded),
            "REVOKED" => Ok(Self::Revoked),
            _ => Err(ImageStateParseError(s.to_owned())),
        }
    }
}

/// Reference to a package revision bundled into an image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageVersionRef {
    pub organization: String,
    pub package_name: String,
    pub package_version: Version,
}

/// Persisted image record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub image_id: ImageId,
    pub image_type: String,
    pub image_name: String,
    pub image_version: Version,
    pub organization: String,
    pub category: Option<String>,
    pub extension: Option<String>,
    pub platform_chipset: String,
    pub element_roles: BTreeSet<String>,
    pub image_state: ImageState,
    pub build_id: Option<String>,
    pub build_date: Option<DateTime<Utc>>,
    pub checksums: BTreeMap<String, String>,
    pub packages: Vec<PackageVersionRef>,
    pub applications: Vec<String>,
}

impl Image {
    /// Logical key: (name, type, chipset), shared by all revisions of an image line
    pub fn logical_key(&self) -> LogicalKey {
        LogicalKey {
            image_name: self.image_name.clone(),
            image_type: self.image_type.clone(),
            platform_chipset: self.platform_chipset.clone(),
        }
    }
}

/// Groups all versions of the same image line, independent of role or state
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogicalKey {
    pub image_name: String,
    pub image_type: String,
    pub platform_chipset: String,
}

/// Image submission accepted by `storeImage`.
///
/// Missing `image_id` means "create with a fresh id".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    #[serde(default)]
    pub image_id: Option<ImageId>,
    pub image_type: String,
    pub image_name: String,
    pub image_version: Version,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub extension: Option<String>,
    pub platform_chipset: String,
    pub element_roles: BTreeSet<String>,
    #[serde(default)]
    pub image_state: ImageState,
    #[serde(default)]
    pub build_id: Option<String>,
    #[serde(default)]
    pub build_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub checksums: BTreeMap<String, String>,
    #[serde(default)]
    pub packages: Vec<PackageVersionRef>,
    #[serde(default)]
    pub applications: Vec<String>,
}

impl ImageInfo {
    /// Minimal submission; everything optional is left empty
    pub fn new(
        image_type: impl Into<String>,
        image_name: impl Into<String>,
        image_version: Version,
        platform_chipset: impl Into<String>,
    ) -> Self {
        Self {
            image_id: None,
            image_type: image_type.into(),
            image_name: image_name.into(),
            image_version,
            organization: String::new(),
            category: None,
            extension: None,
            platform_chipset: platform_chipset.into(),
            element_roles: BTreeSet::new(),
            image_state: ImageState::default(),
            build_id: None,
            build_date: None,
            checksums: BTreeMap::new(),
            packages: Vec::new(),
            applications: Vec::new(),
        }
    }

    pub fn with_id(mut self, image_id: ImageId) -> Self {
        self.image_id = Some(image_id);
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.element_roles.insert(role.into());
        self
    }

    pub fn with_state(mut self, state: ImageState) -> Self {
        self.image_state = state;
        self
    }

    /// Materialize the submission as an image record with the given identity
    pub fn into_image(self, image_id: ImageId) -> Image {
        Image {
            image_id,
            image_type: self.image_type,
            image_name: self.image_name,
            image_version: self.image_version,
            organization: self.organization,
            category: self.category,
            extension: self.extension,
            platform_chipset: self.platform_chipset,
            element_roles: self.element_roles,
            image_state: self.image_state,
            build_id: self.build_id,
            build_date: self.build_date,
            checksums: self.checksums,
            packages: self.packages,
            applications: self.applications,
        }
    }
}

/// Search filter for image listings. Every `None` field matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageQuery {
    /// Substring of the image name
    pub name_filter: Option<String>,
    pub role: Option<String>,
    pub image_type: Option<String>,
    pub state: Option<ImageState>,
    pub version: Option<Version>,
    /// Maximum number of results, 0 selects the default limit
    #[serde(default)]
    pub limit: usize,
}

/// Deployment counts of a single image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageStatistics {
    pub image: Image,
    pub active_count: u64,
    pub cached_count: u64,
}

impl From<Image> for ImageInfo {
    fn from(image: Image) -> Self {
        Self {
            image_id: Some(image.image_id),
            image_type: image.image_type,
            image_name: image.image_name,
            image_version: image.image_version,
            organization: image.organization,
            category: image.category,
            extension: image.extension,
            platform_chipset: image.platform_chipset,
            element_roles: image.element_roles,
            image_state: image.image_state,
            build_id: image.build_id,
            build_date: image.build_date,
            checksums: image.checksums,
            packages: image.packages,
            applications: image.applications,
        }
    }
}

/// An image line released for some role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleImage {
    pub image_type: String,
    pub image_name: String,
}

/// Image lines applicable to one element role, ordered by name then type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleImages {
    pub element_role: String,
    pub images: Vec<RoleImage>,
}

/// Full image records as written by `export_images` and read back by `import_images`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagesExport {
    pub date_created: DateTime<Utc>,
    pub images: Vec<ImageInfo>,
}
