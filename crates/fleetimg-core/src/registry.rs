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

//! Image registry: durable image records keyed by image id

use crate::db::parse_column;
use crate::error::{ImageError, ReasonCode, Result};
use crate::roles::RoleCatalog;
use fleetimg_types::{
    Image, ImageId, ImageQuery, ImageState, InstallState, LogicalKey, PackageVersionRef, RoleImage,
    Version,
};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::collections::BTreeSet;

const DEFAULT_QUERY_LIMIT: usize = 100;

const IMAGE_COLUMNS: &str = "i.seq, i.image_id, i.image_type, i.image_name,
     i.major, i.minor, i.patch, i.organization, i.category, i.extension,
     i.platform_chipset, i.image_state, i.build_id, i.build_date";

/// Image registry bound to one connection or transaction
#[derive(Debug, Clone, Copy)]
pub struct ImageRegistry<'c> {
    conn: &'c Connection,
}

/// Reject role sets that are empty or reference roles unknown to the catalog
pub fn check_roles(catalog: &dyn RoleCatalog, roles: &BTreeSet<String>) -> Result<()> {
    if roles.is_empty() {
        return Err(ImageError::not_found(
            ReasonCode::RoleNotFound,
            "image must apply to at least one element role",
        ));
    }
    if let Some(missing) = roles.iter().find(|r| !catalog.role_exists(r)) {
        return Err(ImageError::not_found(
            ReasonCode::RoleNotFound,
            format!("element role {missing} does not exist"),
        ));
    }
    Ok(())
}

fn map_image_row(row: &Row<'_>) -> rusqlite::Result<(i64, Image)> {
    let image = Image {
        image_id: parse_column(row, 1)?,
        image_type: row.get(2)?,
        image_name: row.get(3)?,
        image_version: Version::new(row.get(4)?, row.get(5)?, row.get(6)?),
        organization: row.get(7)?,
        category: row.get(8)?,
        extension: row.get(9)?,
        platform_chipset: row.get(10)?,
        element_roles: BTreeSet::new(),
        image_state: parse_column(row, 11)?,
        build_id: row.get(12)?,
        build_date: row.get(13)?,
        checksums: Default::default(),
        packages: Vec::new(),
        applications: Vec::new(),
    };
    Ok((row.get(0)?, image))
}

impl<'c> ImageRegistry<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub(crate) fn seq_of(&self, image_id: &ImageId) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT seq FROM images WHERE image_id = ?1",
                params![image_id.to_string()],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Persist a new image. Roles are validated before anything is written.
    pub fn create(&self, image: &Image, roles: &dyn RoleCatalog) -> Result<ImageId> {
        check_roles(roles, &image.element_roles)?;

        self.conn.execute(
            "INSERT INTO images (image_id, image_type, image_name, major, minor, patch,
                organization, category, extension, platform_chipset, image_state, build_id,
                build_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                image.image_id.to_string(),
                image.image_type,
                image.image_name,
                image.image_version.major,
                image.image_version.minor,
                image.image_version.patch,
                image.organization,
                image.category,
                image.extension,
                image.platform_chipset,
                image.image_state.as_str(),
                image.build_id,
                image.build_date,
            ],
        )?;
        let seq = self.conn.last_insert_rowid();
        self.write_associations(seq, image)?;

        tracing::debug!(image_id = %image.image_id, "Created image {}", image.image_name);
        Ok(image.image_id)
    }

    /// Replace all mutable attributes. The stored state is left untouched.
    pub fn update(&self, image: &Image, roles: &dyn RoleCatalog) -> Result<()> {
        check_roles(roles, &image.element_roles)?;
        let seq = self.require_seq(&image.image_id)?;

        self.conn.execute(
            "UPDATE images SET image_type = ?1, image_name = ?2, major = ?3, minor = ?4,
                patch = ?5, organization = ?6, category = ?7, extension = ?8,
                platform_chipset = ?9, build_id = ?10, build_date = ?11
             WHERE seq = ?12",
            params![
                image.image_type,
                image.image_name,
                image.image_version.major,
                image.image_version.minor,
                image.image_version.patch,
                image.organization,
                image.category,
                image.extension,
                image.platform_chipset,
                image.build_id,
                image.build_date,
                seq,
            ],
        )?;
        self.write_associations(seq, image)?;

        tracing::debug!(image_id = %image.image_id, "Updated image {}", image.image_name);
        Ok(())
    }

    fn write_associations(&self, seq: i64, image: &Image) -> Result<()> {
        for table in [
            "image_roles",
            "image_checksums",
            "image_packages",
            "image_applications",
        ] {
            self.conn.execute(
                &format!("DELETE FROM {table} WHERE image_seq = ?1"),
                params![seq],
            )?;
        }

        for role in &image.element_roles {
            self.conn.execute(
                "INSERT INTO image_roles (image_seq, role) VALUES (?1, ?2)",
                params![seq, role],
            )?;
        }
        for (algorithm, digest) in &image.checksums {
            self.conn.execute(
                "INSERT INTO image_checksums (image_seq, algorithm, digest) VALUES (?1, ?2, ?3)",
                params![seq, algorithm, digest],
            )?;
        }
        for (position, package) in image.packages.iter().enumerate() {
            self.conn.execute(
                "INSERT INTO image_packages
                    (image_seq, position, organization, package_name, package_version)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    seq,
                    position,
                    package.organization,
                    package.package_name,
                    package.package_version.to_string(),
                ],
            )?;
        }
        for (position, name) in image.applications.iter().enumerate() {
            self.conn.execute(
                "INSERT INTO image_applications (image_seq, position, name) VALUES (?1, ?2, ?3)",
                params![seq, position, name],
            )?;
        }
        Ok(())
    }

    fn load_associations(&self, seq: i64, image: &mut Image) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT role FROM image_roles WHERE image_seq = ?1 ORDER BY role")?;
        image.element_roles = stmt
            .query_map(params![seq], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;

        let mut stmt = self.conn.prepare_cached(
            "SELECT algorithm, digest FROM image_checksums WHERE image_seq = ?1",
        )?;
        image.checksums = stmt
            .query_map(params![seq], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?;

        let mut stmt = self.conn.prepare_cached(
            "SELECT organization, package_name, package_version FROM image_packages
             WHERE image_seq = ?1 ORDER BY position",
        )?;
        image.packages = stmt
            .query_map(params![seq], |row| {
                Ok(PackageVersionRef {
                    organization: row.get(0)?,
                    package_name: row.get(1)?,
                    package_version: parse_column(row, 2)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;

        let mut stmt = self.conn.prepare_cached(
            "SELECT name FROM image_applications WHERE image_seq = ?1 ORDER BY position",
        )?;
        image.applications = stmt
            .query_map(params![seq], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;

        Ok(())
    }

    /// Run an image query and hydrate every hit with its associations
    fn select(&self, sql: &str, args: &[Value]) -> Result<Vec<Image>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), map_image_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut images = Vec::with_capacity(rows.len());
        for (seq, mut image) in rows {
            self.load_associations(seq, &mut image)?;
            images.push(image);
        }
        Ok(images)
    }

    pub(crate) fn find_by_seq(&self, seq: i64) -> Result<Option<Image>> {
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM images i WHERE i.seq = ?1");
        Ok(self.select(&sql, &[Value::Integer(seq)])?.into_iter().next())
    }

    /// Look up an image, `None` if the id is unknown
    pub fn find(&self, image_id: &ImageId) -> Result<Option<Image>> {
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM images i WHERE i.image_id = ?1");
        Ok(self
            .select(&sql, &[Value::Text(image_id.to_string())])?
            .into_iter()
            .next())
    }

    pub fn get(&self, image_id: &ImageId) -> Result<Image> {
        self.find(image_id)?.ok_or_else(|| {
            ImageError::not_found(ReasonCode::ImageNotFound, format!("image {image_id} not found"))
        })
    }

    fn require_seq(&self, image_id: &ImageId) -> Result<i64> {
        self.seq_of(image_id)?.ok_or_else(|| {
            ImageError::not_found(ReasonCode::ImageNotFound, format!("image {image_id} not found"))
        })
    }

    pub fn exists(&self, image_id: &ImageId) -> Result<bool> {
        Ok(self.seq_of(image_id)?.is_some())
    }

    /// All revisions of an image line regardless of role or state, oldest record first
    pub fn find_by_logical_key(&self, key: &LogicalKey) -> Result<Vec<Image>> {
        let sql = format!(
            "SELECT {IMAGE_COLUMNS} FROM images i
             WHERE i.image_name = ?1 AND i.image_type = ?2 AND i.platform_chipset = ?3
             ORDER BY i.seq"
        );
        self.select(
            &sql,
            &[
                Value::Text(key.image_name.clone()),
                Value::Text(key.image_type.clone()),
                Value::Text(key.platform_chipset.clone()),
            ],
        )
    }

    /// Images of one line with the given version, oldest record first
    pub fn find_by_type_name_version(
        &self,
        image_type: &str,
        image_name: &str,
        version: Version,
    ) -> Result<Vec<Image>> {
        let sql = format!(
            "SELECT {IMAGE_COLUMNS} FROM images i
             WHERE i.image_type = ?1 AND i.image_name = ?2
               AND i.major = ?3 AND i.minor = ?4 AND i.patch = ?5
             ORDER BY i.seq"
        );
        self.select(
            &sql,
            &[
                Value::Text(image_type.to_owned()),
                Value::Text(image_name.to_owned()),
                Value::Integer(version.major.into()),
                Value::Integer(version.minor.into()),
                Value::Integer(version.patch.into()),
            ],
        )
    }

    /// Images in `state` that apply to `role` within a logical key
    pub fn find_by_role_and_state(
        &self,
        key: &LogicalKey,
        role: &str,
        state: ImageState,
    ) -> Result<Vec<Image>> {
        let sql = format!(
            "SELECT {IMAGE_COLUMNS} FROM images i
             JOIN image_roles r ON r.image_seq = i.seq
             WHERE i.image_name = ?1 AND i.image_type = ?2 AND i.platform_chipset = ?3
               AND r.role = ?4 AND i.image_state = ?5
             ORDER BY i.seq"
        );
        self.select(
            &sql,
            &[
                Value::Text(key.image_name.clone()),
                Value::Text(key.image_type.clone()),
                Value::Text(key.platform_chipset.clone()),
                Value::Text(role.to_owned()),
                Value::Text(state.as_str().to_owned()),
            ],
        )
    }

    /// Overwrite the lifecycle state. Only the lifecycle manager calls this.
    pub(crate) fn set_state(&self, image_id: &ImageId, state: ImageState) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE images SET image_state = ?1 WHERE image_id = ?2",
            params![state.as_str(), image_id.to_string()],
        )?;
        if updated == 0 {
            return Err(ImageError::not_found(
                ReasonCode::ImageNotFound,
                format!("image {image_id} not found"),
            ));
        }
        Ok(())
    }

    /// Number of element bindings per install state
    pub fn binding_counts(&self, image_id: &ImageId) -> Result<(u64, u64)> {
        let seq = self.require_seq(image_id)?;
        let mut stmt = self.conn.prepare_cached(
            "SELECT install_state, COUNT(*) FROM element_images
             WHERE image_seq = ?1 GROUP BY install_state",
        )?;
        let mut active = 0;
        let mut cached = 0;
        let rows = stmt.query_map(params![seq], |row| {
            Ok((parse_column::<InstallState>(row, 0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (state, n) = row?;
            let n = u64::try_from(n).unwrap_or_default();
            match state {
                InstallState::Active => active = n,
                InstallState::Cached => cached = n,
            }
        }
        Ok((active, cached))
    }

    /// Delete an image that no element references.
    ///
    /// Roles, checksums, packages and applications go with it.
    pub fn remove(&self, image_id: &ImageId) -> Result<Image> {
        let image = self.get(image_id)?;
        let (active, cached) = self.binding_counts(image_id)?;
        let references = active + cached;
        if references > 0 {
            tracing::debug!(
                image_id = %image_id,
                "Cannot remove image {} because it is referenced from {references} elements",
                image.image_name
            );
            return Err(ImageError::conflict(
                ReasonCode::ImageNotRemovable,
                format!(
                    "image {} ({image_id}) is referenced from {references} elements",
                    image.image_name
                ),
            ));
        }

        self.conn.execute(
            "DELETE FROM images WHERE image_id = ?1",
            params![image_id.to_string()],
        )?;
        tracing::debug!(image_id = %image_id, "Removed image {}", image.image_name);
        Ok(image)
    }

    pub fn query(&self, query: &ImageQuery) -> Result<Vec<Image>> {
        let mut sql = format!("SELECT {IMAGE_COLUMNS} FROM images i WHERE 1 = 1");
        let mut args: Vec<Value> = Vec::new();

        if let Some(filter) = query.name_filter.as_deref().filter(|f| !f.is_empty()) {
            args.push(Value::Text(filter.to_owned()));
            sql.push_str(&format!(" AND instr(i.image_name, ?{}) > 0", args.len()));
        }
        if let Some(role) = &query.role {
            args.push(Value::Text(role.clone()));
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM image_roles r
                   WHERE r.image_seq = i.seq AND r.role = ?{})",
                args.len()
            ));
        }
        if let Some(image_type) = &query.image_type {
            args.push(Value::Text(image_type.clone()));
            sql.push_str(&format!(" AND i.image_type = ?{}", args.len()));
        }
        if let Some(state) = query.state {
            args.push(Value::Text(state.as_str().to_owned()));
            sql.push_str(&format!(" AND i.image_state = ?{}", args.len()));
        }
        if let Some(version) = query.version {
            for level in [version.major, version.minor, version.patch] {
                args.push(Value::Integer(level.into()));
            }
            let n = args.len();
            sql.push_str(&format!(
                " AND i.major = ?{} AND i.minor = ?{} AND i.patch = ?{n}",
                n - 2,
                n - 1
            ));
        }

        let limit = if query.limit == 0 {
            DEFAULT_QUERY_LIMIT
        } else {
            query.limit
        };
        args.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        sql.push_str(&format!(
            " ORDER BY i.image_name, i.image_type, i.major DESC, i.minor DESC, i.patch DESC, i.seq
              LIMIT ?{}",
            args.len()
        ));

        self.select(&sql, &args)
    }

    /// Distinct (type, name) pairs of images that apply to `role`, by name then type
    pub fn role_images(&self, role: &str) -> Result<Vec<RoleImage>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT i.image_type, i.image_name FROM images i
             JOIN image_roles r ON r.image_seq = i.seq
             WHERE r.role = ?1
             ORDER BY i.image_name, i.image_type",
        )?;
        let images = stmt
            .query_map(params![role], |row| {
                Ok(RoleImage {
                    image_type: row.get(0)?,
                    image_name: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;
        Ok(images)
    }

    pub fn image_types(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT image_type FROM images ORDER BY image_type ASC")?;
        let types = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(types)
    }

    pub fn image_versions(&self, image_type: &str) -> Result<Vec<Version>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT major, minor, patch FROM images WHERE image_type = ?1
             ORDER BY major, minor, patch ASC",
        )?;
        let versions = stmt
            .query_map(params![image_type], |row| {
                Ok(Version::new(row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<rusqlite::Result<_>>()?;
        Ok(versions)
    }
}
