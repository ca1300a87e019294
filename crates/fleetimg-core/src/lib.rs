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

//! FleetImg Core - image release and update resolution engine
//!
//! Tracks software images through their lifecycle, enforces the per-role
//! release slot rule on promotion, reconciles the images each element reports
//! as installed and classifies the updates available to them.

pub mod bindings;
pub mod db;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod messages;
pub mod reconciler;
pub mod registry;
pub mod roles;
pub mod slots;
pub mod updates;

pub use db::Database;
pub use error::{ImageError, ReasonCode, Result};
pub use events::{EventSink, ImageEvent, ImageEventPayload, TracingEventSink};
pub use lifecycle::{ImageService, StoredImage};
pub use messages::{Message, MessageSink, Severity, TracingMessageSink};
pub use reconciler::{ElementImageService, ReconcileSummary};
pub use registry::ImageRegistry;
pub use roles::{RoleCatalog, StaticRoleCatalog};
pub use slots::SlotKey;
