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

//! Error types for the image release engine

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable reason codes attached to errors and operator messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    ImageNotFound,
    RoleNotFound,
    ImageNotRemovable,
    ImageActive,
    IllegalStateTransition,
    MultipleActiveImages,
    ElementImageNotFound,
    ImageStored,
    ImageRemoved,
    ImageStateUpdated,
    ElementImageRemoved,
    ElementImageUnknown,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImageNotFound => "IMAGE_NOT_FOUND",
            Self::RoleNotFound => "ROLE_NOT_FOUND",
            Self::ImageNotRemovable => "IMAGE_NOT_REMOVABLE",
            Self::ImageActive => "IMAGE_ACTIVE",
            Self::IllegalStateTransition => "ILLEGAL_STATE_TRANSITION",
            Self::MultipleActiveImages => "MULTIPLE_ACTIVE_IMAGES",
            Self::ElementImageNotFound => "ELEMENT_IMAGE_NOT_FOUND",
            Self::ImageStored => "IMAGE_STORED",
            Self::ImageRemoved => "IMAGE_REMOVED",
            Self::ImageStateUpdated => "IMAGE_STATE_UPDATED",
            Self::ElementImageRemoved => "ELEMENT_IMAGE_REMOVED",
            Self::ElementImageUnknown => "ELEMENT_IMAGE_UNKNOWN",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("{reason}: {detail}")]
    NotFound { reason: ReasonCode, detail: String },

    #[error("{reason}: {detail}")]
    Conflict { reason: ReasonCode, detail: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl ImageError {
    pub fn not_found(reason: ReasonCode, detail: impl Into<String>) -> Self {
        Self::NotFound {
            reason,
            detail: detail.into(),
        }
    }

    pub fn conflict(reason: ReasonCode, detail: impl Into<String>) -> Self {
        Self::Conflict {
            reason,
            detail: detail.into(),
        }
    }

    /// Reason code of a rejected operation, `None` for infrastructure failures
    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            Self::NotFound { reason, .. } | Self::Conflict { reason, .. } => Some(*reason),
            Self::Database(_) | Self::Io(_) | Self::Corrupt(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, ImageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_reason() {
        let err = ImageError::conflict(ReasonCode::ImageNotRemovable, "image routing is in use");
        assert_eq!(
            err.to_string(),
            "IMAGE_NOT_REMOVABLE: image routing is in use"
        );
        assert_eq!(err.reason(), Some(ReasonCode::ImageNotRemovable));
        assert!(err.is_conflict());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_reason_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ReasonCode::ElementImageUnknown).unwrap();
        assert_eq!(json, "\"ELEMENT_IMAGE_UNKNOWN\"");
    }
}
