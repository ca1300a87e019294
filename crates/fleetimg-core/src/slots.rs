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

//! Release slots: at most one RELEASE image per (name, type, chipset, role)

use crate::error::Result;
use crate::registry::ImageRegistry;
use fleetimg_types::{Image, ImageId, ImageState, LogicalKey};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SlotKey {
    pub image_name: String,
    pub image_type: String,
    pub platform_chipset: String,
    pub role: String,
}

impl SlotKey {
    pub fn logical_key(&self) -> LogicalKey {
        LogicalKey {
            image_name: self.image_name.clone(),
            image_type: self.image_type.clone(),
            platform_chipset: self.platform_chipset.clone(),
        }
    }
}

/// One slot key per role the image applies to
pub fn slot_keys(image: &Image) -> Vec<SlotKey> {
    image
        .element_roles
        .iter()
        .map(|role| SlotKey {
            image_name: image.image_name.clone(),
            image_type: image.image_type.clone(),
            platform_chipset: image.platform_chipset.clone(),
            role: role.clone(),
        })
        .collect()
}

/// Images currently in RELEASE state holding `slot`
pub fn slot_holders(registry: &ImageRegistry<'_>, slot: &SlotKey) -> Result<Vec<Image>> {
    registry.find_by_role_and_state(&slot.logical_key(), &slot.role, ImageState::Release)
}

/// Supersede every other image that holds one of `image`'s slots.
///
/// Superseded images do not cascade further. Returns the superseded images
/// in their pre-change form, each listed once.
pub fn supersede_slot_holders(registry: &ImageRegistry<'_>, image: &Image) -> Result<Vec<Image>> {
    let mut seen: BTreeSet<ImageId> = BTreeSet::new();
    let mut superseded = Vec::new();

    for slot in slot_keys(image) {
        for holder in slot_holders(registry, &slot)? {
            if holder.image_id == image.image_id || !seen.insert(holder.image_id) {
                continue;
            }
            registry.set_state(&holder.image_id, ImageState::Superseded)?;
            tracing::info!(
                image_id = %holder.image_id,
                "Image {} {} superseded in slot {}/{}/{}/{}",
                holder.image_name,
                holder.image_version,
                slot.image_name,
                slot.image_type,
                slot.platform_chipset,
                slot.role
            );
            superseded.push(holder);
        }
    }
    Ok(superseded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::roles::StaticRoleCatalog;
    use fleetimg_types::{ImageInfo, Version};

    fn roles() -> StaticRoleCatalog {
        StaticRoleCatalog::new(["R1", "R2", "R3"])
    }

    fn image(version: Version, roles: &[&str], state: ImageState) -> Image {
        let mut info = ImageInfo::new("lxd", "routing", version, "trident3").with_state(state);
        for role in roles {
            info = info.with_role(*role);
        }
        info.into_image(ImageId::random())
    }

    #[test]
    fn test_slot_keys_cover_each_role() {
        let img = image(Version::new(1, 0, 0), &["R1", "R2"], ImageState::Candidate);
        let keys = slot_keys(&img);
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().all(|k| k.image_name == "routing"
            && k.image_type == "lxd"
            && k.platform_chipset == "trident3"));
        let roles: Vec<_> = keys.iter().map(|k| k.role.as_str()).collect();
        assert_eq!(roles, vec!["R1", "R2"]);
    }

    #[test]
    fn test_supersedes_holders_of_overlapping_slots_only() {
        let db = Database::open_in_memory().unwrap();
        let a = image(Version::new(1, 0, 0), &["R1"], ImageState::Release);
        let c = image(Version::new(1, 0, 0), &["R3"], ImageState::Release);
        let d = image(Version::new(1, 1, 0), &["R2"], ImageState::Release);
        let b = image(Version::new(2, 0, 0), &["R1", "R2"], ImageState::Candidate);

        let (superseded, states) = db
            .transaction(|tx| {
                let registry = ImageRegistry::new(tx);
                for img in [&a, &b, &c, &d] {
                    registry.create(img, &roles())?;
                }
                let superseded = supersede_slot_holders(&registry, &b)?;
                let states = [&a, &b, &c, &d]
                    .iter()
                    .map(|img| registry.get(&img.image_id).map(|i| i.image_state))
                    .collect::<Result<Vec<_>>>()?;
                Ok((superseded, states))
            })
            .unwrap();

        let mut ids: Vec<_> = superseded.iter().map(|i| i.image_id).collect();
        ids.sort();
        let mut expected = vec![a.image_id, d.image_id];
        expected.sort();
        assert_eq!(ids, expected);
        assert_eq!(
            states,
            vec![
                ImageState::Superseded,
                ImageState::Candidate,
                ImageState::Release,
                ImageState::Superseded
            ]
        );
    }

    #[test]
    fn test_holder_spanning_two_slots_is_superseded_once() {
        let db = Database::open_in_memory().unwrap();
        let a = image(Version::new(1, 0, 0), &["R1", "R2"], ImageState::Release);
        let b = image(Version::new(2, 0, 0), &["R1", "R2"], ImageState::Candidate);

        let superseded = db
            .transaction(|tx| {
                let registry = ImageRegistry::new(tx);
                registry.create(&a, &roles())?;
                registry.create(&b, &roles())?;
                supersede_slot_holders(&registry, &b)
            })
            .unwrap();
        assert_eq!(superseded.len(), 1);
        assert_eq!(superseded[0].image_id, a.image_id);
    }

    #[test]
    fn test_different_chipset_is_a_different_slot() {
        let db = Database::open_in_memory().unwrap();
        let mut a = image(Version::new(1, 0, 0), &["R1"], ImageState::Release);
        a.platform_chipset = "tomahawk".to_owned();
        let b = image(Version::new(2, 0, 0), &["R1"], ImageState::Candidate);

        let superseded = db
            .transaction(|tx| {
                let registry = ImageRegistry::new(tx);
                registry.create(&a, &roles())?;
                registry.create(&b, &roles())?;
                supersede_slot_holders(&registry, &b)
            })
            .unwrap();
        assert!(superseded.is_empty());
    }
}
