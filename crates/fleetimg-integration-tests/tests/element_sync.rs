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

//! Installed-image reconciliation against a shared registry

use fleetimg_core::ReasonCode;
use fleetimg_integration_tests::Engine;
use fleetimg_types::{ElementId, ElementRef, ImageState, InstallState, InstalledImageRef, Version};

const V1: Version = Version::new(1, 0, 0);
const V2: Version = Version::new(2, 0, 0);
const V3: Version = Version::new(3, 0, 0);

fn bindings(engine: &Engine, element: &str) -> Vec<(String, Version, InstallState)> {
    engine
        .elements
        .element_images(&ElementId::new(element))
        .unwrap()
        .into_iter()
        .map(|i| (i.image.image_name, i.image.image_version, i.install_state))
        .collect()
}

#[test]
fn test_reconcile_is_idempotent() -> anyhow::Result<()> {
    let engine = Engine::in_memory()?;
    for version in [V1, V2, V3] {
        engine.routing(version, &["SPINE"], ImageState::Candidate)?;
    }
    let element = ElementRef::new("spine-1");
    let refs = [
        InstalledImageRef::active("lxd", "routing", V2),
        InstalledImageRef::cached("lxd", "routing", V1),
        InstalledImageRef::cached("lxd", "routing", V3),
    ];

    engine.elements.store_installed_images(&element, &refs)?;
    let once = bindings(&engine, "spine-1");

    let again = engine.elements.store_installed_images(&element, &refs)?;
    assert_eq!(bindings(&engine, "spine-1"), once);
    assert_eq!((again.added, again.updated, again.removed), (0, 0, 0));
    assert_eq!(again.unchanged, 3);
    Ok(())
}

#[test]
fn test_reconcile_leaves_other_lines_alone() -> anyhow::Result<()> {
    let engine = Engine::in_memory()?;
    engine.routing(V1, &["SPINE"], ImageState::Release)?;
    engine.images.store_image(
        fleetimg_types::ImageInfo::new("lxd", "telemetry", V1, "trident3").with_role("SPINE"),
    )?;
    let element = ElementRef::new("spine-1");

    engine.elements.store_installed_images(
        &element,
        &[
            InstalledImageRef::active("lxd", "routing", V1),
            InstalledImageRef::active("lxd", "telemetry", V1),
        ],
    )?;
    // a report about routing alone must not drop telemetry
    engine.elements.store_installed_images(
        &element,
        &[InstalledImageRef::cached("lxd", "routing", V1)],
    )?;

    assert_eq!(
        bindings(&engine, "spine-1"),
        vec![
            ("routing".to_owned(), V1, InstallState::Cached),
            ("telemetry".to_owned(), V1, InstallState::Active),
        ]
    );
    Ok(())
}

#[test]
fn test_active_binding_may_be_dropped_by_reconcile() -> anyhow::Result<()> {
    let engine = Engine::in_memory()?;
    engine.routing(V1, &["SPINE"], ImageState::Candidate)?;
    engine.routing(V2, &["SPINE"], ImageState::Candidate)?;
    let element = ElementRef::new("spine-1");

    engine.elements.store_installed_images(
        &element,
        &[InstalledImageRef::active("lxd", "routing", V1)],
    )?;
    engine.elements.store_installed_images(
        &element,
        &[InstalledImageRef::active("lxd", "routing", V2)],
    )?;

    assert_eq!(
        bindings(&engine, "spine-1"),
        vec![("routing".to_owned(), V2, InstallState::Active)]
    );
    Ok(())
}

#[test]
fn test_bulk_remove_is_all_or_nothing() -> anyhow::Result<()> {
    let engine = Engine::in_memory()?;
    engine.routing(V1, &["SPINE"], ImageState::Candidate)?;
    engine.routing(V2, &["SPINE"], ImageState::Candidate)?;
    let element = ElementId::new("spine-1");
    let cached = InstalledImageRef::cached("lxd", "routing", V1);
    let active = InstalledImageRef::active("lxd", "routing", V2);
    engine.elements.store_installed_images(
        &ElementRef::new("spine-1"),
        &[cached.clone(), active.clone()],
    )?;
    let before = bindings(&engine, "spine-1");

    let err = engine
        .elements
        .remove_cached_images(&element, &[cached.clone(), active])
        .unwrap_err();
    assert_eq!(err.reason(), Some(ReasonCode::ImageActive));
    assert_eq!(bindings(&engine, "spine-1"), before);

    let missing = InstalledImageRef::cached("lxd", "routing", V3);
    let removed = engine
        .elements
        .remove_cached_images(&element, &[cached, missing])?;
    assert_eq!(removed, 1);
    assert_eq!(
        bindings(&engine, "spine-1"),
        vec![("routing".to_owned(), V2, InstallState::Active)]
    );
    Ok(())
}

#[test]
fn test_unknown_reports_do_not_fail() -> anyhow::Result<()> {
    let engine = Engine::in_memory()?;
    engine.routing(V1, &["SPINE"], ImageState::Release)?;
    engine.recorder.clear();

    let summary = engine.elements.store_installed_images(
        &ElementRef::new("spine-1"),
        &[
            InstalledImageRef::active("lxd", "routing", V1),
            InstalledImageRef::cached("lxd", "routing", V2),
        ],
    )?;
    assert_eq!(summary.added, 1);
    assert_eq!(summary.unresolved.len(), 1);

    let messages = engine.recorder.messages();
    assert!(
        messages
            .iter()
            .any(|m| m.reason == ReasonCode::ElementImageUnknown)
    );

    // removing something never installed is not an error
    assert!(
        !engine
            .elements
            .remove_installed_image(&ElementId::new("spine-1"), "lxd", "routing", V3)?
    );
    Ok(())
}
