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

//! Human readable outcome notices

use crate::error::ReasonCode;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub reason: ReasonCode,
    pub severity: Severity,
    pub text: String,
}

impl Message {
    pub fn info(reason: ReasonCode, text: impl Into<String>) -> Self {
        Self {
            reason,
            severity: Severity::Info,
            text: text.into(),
        }
    }

    pub fn warning(reason: ReasonCode, text: impl Into<String>) -> Self {
        Self {
            reason,
            severity: Severity::Warning,
            text: text.into(),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.text)
    }
}

/// Receives operator notices. Purely observational.
pub trait MessageSink: Send + Sync + fmt::Debug {
    fn add(&self, message: Message);
}

/// Default sink: writes every notice to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMessageSink;

impl MessageSink for TracingMessageSink {
    fn add(&self, message: Message) {
        match message.severity {
            Severity::Info => tracing::info!(reason = %message.reason, "{}", message.text),
            Severity::Warning => tracing::warn!(reason = %message.reason, "{}", message.text),
        }
    }
}
