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

mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use fleetimg_core::{
    Database, ElementImageService, ImageService, StaticRoleCatalog, TracingEventSink,
    TracingMessageSink,
};
use fleetimg_types::{ElementId, ElementRef, ImageInfo, ImagesExport, InstalledImageRef};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

use cli::{Cli, Commands, ElementCommand, ImageCommand};
use config::AppConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(&cli.config)?;
    if let Some(database) = &cli.database {
        config.database.path.clone_from(database);
    }

    // RUST_LOG wins over the configured filter
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.filter)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let db = Arc::new(Database::open(&config.database.path).with_context(|| {
        format!(
            "Failed to open image database at {}",
            config.database.path.display()
        )
    })?);
    info!("Using image database {}", config.database.path.display());

    let messages = Arc::new(TracingMessageSink);
    let images = ImageService::new(
        db.clone(),
        Arc::new(StaticRoleCatalog::new(&config.roles.known)),
        Arc::new(TracingEventSink),
        messages.clone(),
    );
    let elements = ElementImageService::new(db, messages);

    match cli.command {
        Commands::Image(command) => run_image(&images, command),
        Commands::Element(command) => run_element(&elements, command),
    }
}

fn run_image(images: &ImageService, command: ImageCommand) -> Result<()> {
    match command {
        ImageCommand::Store { file } => {
            let submission: ImageInfo = read_json(&file)?;
            let stored = images.store_image(submission)?;
            print_json(&serde_json::json!({
                "image_id": stored.image_id,
                "created": stored.created,
            }))
        }
        ImageCommand::Get { image_id } => print_json(&images.get_image(&image_id)?),
        ImageCommand::List(args) => {
            print_json(&images.find_images(&args.filter.into_query(args.limit))?)
        }
        ImageCommand::State { image_id, state } => {
            images.update_image_state(&image_id, state)?;
            print_json(&images.get_image(&image_id)?)
        }
        ImageCommand::Remove { image_id } => print_json(&images.remove_image(&image_id)?),
        ImageCommand::Types => print_json(&images.image_types()?),
        ImageCommand::Versions { image_type } => print_json(&images.image_versions(&image_type)?),
        ImageCommand::Stats { image_id } => print_json(&images.image_statistics(&image_id)?),
        ImageCommand::Roles { role } => print_json(&images.role_images(&role)?),
        ImageCommand::Export { filter, output } => {
            let export = images.export_images(&filter.into_query(0))?;
            match output {
                Some(path) => {
                    let json = serde_json::to_string_pretty(&export)?;
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!("Exported {} images to {}", export.images.len(), path.display());
                    Ok(())
                }
                None => print_json(&export),
            }
        }
        ImageCommand::Import { file } => {
            let export: ImagesExport = read_json(&file)?;
            print_json(&images.import_images(export)?)
        }
    }
}

fn run_element(elements: &ElementImageService, command: ElementCommand) -> Result<()> {
    match command {
        ElementCommand::Sync {
            element,
            file,
            role,
            chipset,
        } => {
            let refs: Vec<InstalledImageRef> = read_json(&file)?;
            let element = ElementRef {
                element_id: ElementId::new(element),
                element_role: role,
                platform_chipset: chipset,
            };
            print_json(&elements.store_installed_images(&element, &refs)?)
        }
        ElementCommand::Images { element } => {
            print_json(&elements.element_images(&ElementId::new(element))?)
        }
        ElementCommand::Updates { element, image_id } => {
            print_json(&elements.available_updates(&ElementId::new(element), &image_id)?)
        }
        ElementCommand::Remove {
            element,
            image_type,
            image_name,
            version,
        } => {
            let removed = elements.remove_installed_image(
                &ElementId::new(element),
                &image_type,
                &image_name,
                version,
            )?;
            print_json(&serde_json::json!({ "removed": removed }))
        }
        ElementCommand::Prune { element, file } => {
            let refs: Vec<InstalledImageRef> = read_json(&file)?;
            let removed = elements.remove_cached_images(&ElementId::new(element), &refs)?;
            print_json(&serde_json::json!({ "removed": removed }))
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
