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

//! Shared data types for the FleetImg image release engine.
//!
//! Plain records only: no storage, no I/O. The engine lives in `fleetimg-core`.

pub mod element;
pub mod image;
pub mod version;

pub use element::{
    ElementAvailableUpdate, ElementId, ElementImage, ElementRef, InstallState, InstalledImage,
    InstalledImageRef,
};
pub use image::{
    Image, ImageId, ImageIdParseError, ImageInfo, ImageQuery, ImageState, ImageStateParseError,
    ImageStatistics, ImagesExport, LogicalKey, PackageVersionRef, RoleImage, RoleImages,
};
pub use version::{UpdateClass, Version, VersionParseError};
