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

//! Element-image bindings

use crate::db::parse_column;
use crate::error::{ImageError, ReasonCode, Result};
use crate::registry::ImageRegistry;
use chrono::Utc;
use fleetimg_types::{ElementId, ElementImage, Image, ImageId, InstallState};
use rusqlite::{Connection, Row, params};

const BINDING_COLUMNS: &str =
    "b.binding_id, b.element_id, i.image_id, b.install_state, b.installed_at, b.image_seq";

/// A binding together with the image it points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundImage {
    pub binding: ElementImage,
    pub image: Image,
}

fn map_binding_row(row: &Row<'_>) -> rusqlite::Result<(ElementImage, i64)> {
    let binding = ElementImage {
        binding_id: row.get(0)?,
        element_id: ElementId::new(row.get::<_, String>(1)?),
        image_id: parse_column(row, 2)?,
        install_state: parse_column(row, 3)?,
        installed_at: row.get(4)?,
    };
    Ok((binding, row.get(5)?))
}

#[derive(Debug, Clone, Copy)]
pub struct BindingStore<'c> {
    conn: &'c Connection,
}

impl<'c> BindingStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// All bindings of an element in binding id order.
    ///
    /// A binding whose image cannot be loaded is skipped.
    pub fn for_element(&self, element_id: &ElementId) -> Result<Vec<BoundImage>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {BINDING_COLUMNS} FROM element_images b
             JOIN images i ON i.seq = b.image_seq
             WHERE b.element_id = ?1
             ORDER BY b.binding_id"
        ))?;
        let rows = stmt
            .query_map(params![element_id.as_str()], map_binding_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let registry = ImageRegistry::new(self.conn);
        let mut bound = Vec::with_capacity(rows.len());
        for (binding, seq) in rows {
            match registry.find_by_seq(seq)? {
                Some(image) => bound.push(BoundImage { binding, image }),
                None => tracing::debug!(
                    binding_id = binding.binding_id,
                    "Skipping binding with unresolvable image"
                ),
            }
        }
        Ok(bound)
    }

    /// The element's binding to one image, if any
    pub fn find(&self, element_id: &ElementId, image_id: &ImageId) -> Result<Option<BoundImage>> {
        Ok(self
            .for_element(element_id)?
            .into_iter()
            .find(|b| b.binding.image_id == *image_id))
    }

    pub fn get(&self, element_id: &ElementId, image_id: &ImageId) -> Result<BoundImage> {
        self.find(element_id, image_id)?.ok_or_else(|| {
            ImageError::not_found(
                ReasonCode::ElementImageNotFound,
                format!("element {element_id} has no image {image_id}"),
            )
        })
    }

    pub fn insert(
        &self,
        element_id: &ElementId,
        image_id: &ImageId,
        state: InstallState,
    ) -> Result<i64> {
        let seq = ImageRegistry::new(self.conn)
            .seq_of(image_id)?
            .ok_or_else(|| {
                ImageError::not_found(
                    ReasonCode::ImageNotFound,
                    format!("image {image_id} not found"),
                )
            })?;
        self.conn.execute(
            "INSERT INTO element_images (element_id, image_seq, install_state, installed_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![element_id.as_str(), seq, state.as_str(), Utc::now()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn set_state(&self, binding_id: i64, state: InstallState) -> Result<()> {
        self.conn.execute(
            "UPDATE element_images SET install_state = ?1 WHERE binding_id = ?2",
            params![state.as_str(), binding_id],
        )?;
        Ok(())
    }

    pub fn delete(&self, binding_id: i64) -> Result<()> {
        self.conn.execute(
            "DELETE FROM element_images WHERE binding_id = ?1",
            params![binding_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::roles::StaticRoleCatalog;
    use fleetimg_types::{ImageInfo, Version};

    fn image(registry: &ImageRegistry<'_>, version: Version) -> ImageId {
        let image = ImageInfo::new("lxd", "routing", version, "trident3")
            .with_role("SPINE")
            .into_image(ImageId::random());
        registry
            .create(&image, &StaticRoleCatalog::new(["SPINE"]))
            .unwrap()
    }

    #[test]
    fn test_bindings_in_insertion_order() {
        let db = Database::open_in_memory().unwrap();
        db.transaction(|tx| {
            let registry = ImageRegistry::new(tx);
            let store = BindingStore::new(tx);
            let element = ElementId::new("spine-1");
            let newer = image(&registry, Version::new(2, 0, 0));
            let older = image(&registry, Version::new(1, 0, 0));

            store.insert(&element, &newer, InstallState::Active)?;
            let cached = store.insert(&element, &older, InstallState::Cached)?;
            store.set_state(cached, InstallState::Active)?;

            let bound = store.for_element(&element)?;
            assert_eq!(bound.len(), 2);
            assert_eq!(bound[0].image.image_id, newer);
            assert_eq!(bound[1].binding.install_state, InstallState::Active);
            assert!(store.for_element(&ElementId::new("spine-2"))?.is_empty());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_delete_and_missing_binding() {
        let db = Database::open_in_memory().unwrap();
        db.transaction(|tx| {
            let registry = ImageRegistry::new(tx);
            let store = BindingStore::new(tx);
            let element = ElementId::new("spine-1");
            let id = image(&registry, Version::new(1, 0, 0));

            let binding_id = store.insert(&element, &id, InstallState::Cached)?;
            assert_eq!(store.get(&element, &id)?.binding.binding_id, binding_id);
            store.delete(binding_id)?;

            let err = store.get(&element, &id).unwrap_err();
            assert_eq!(err.reason(), Some(ReasonCode::ElementImageNotFound));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_insert_unknown_image_fails() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .transaction(|tx| {
                BindingStore::new(tx).insert(
                    &ElementId::new("spine-1"),
                    &ImageId::random(),
                    InstallState::Active,
                )
            })
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
