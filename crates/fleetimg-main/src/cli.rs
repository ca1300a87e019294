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

use clap::{Args, Parser, Subcommand};
use fleetimg_types::{ImageId, ImageQuery, ImageState, Version};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "fleetimg",
    version,
    about = "Fleet image release and update resolution",
    long_about = "Track software images through their release lifecycle and reconcile the\n\
    images installed on managed elements.\n\
    \nExamples:\n  \
    fleetimg image store routing-2.0.0.json     # Register or update an image\n  \
    fleetimg image state <id> RELEASE           # Promote, superseding slot holders\n  \
    fleetimg element sync spine-1 installed.json\n  \
    fleetimg element updates spine-1 <id>"
)]
pub struct Cli {
    /// Configuration file
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        default_value = crate::config::DEFAULT_CONFIG_PATH
    )]
    pub config: PathBuf,

    /// Database file, overrides `database.path` from the configuration
    #[arg(long, global = true, value_name = "PATH")]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage registered images
    #[command(subcommand)]
    Image(ImageCommand),

    /// Manage images installed on elements
    #[command(subcommand)]
    Element(ElementCommand),
}

#[derive(Subcommand, Debug)]
pub enum ImageCommand {
    /// Create or update an image from a JSON submission
    Store {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Show one image
    Get { image_id: ImageId },

    /// List images matching the filters
    List(ListArgs),

    /// Change the lifecycle state of an image
    #[command(long_about = "Change the lifecycle state of an image.\n\
        \nPromoting to RELEASE supersedes every other released image sharing one of\n\
        its (name, type, chipset, role) slots. RELEASE cannot be revoked directly\n\
        and no image can return to NEW.")]
    State {
        image_id: ImageId,
        #[arg(value_name = "STATE", help = "NEW, CANDIDATE, RELEASE, SUPERSEDED or REVOKED")]
        state: ImageState,
    },

    /// Remove an image no element references
    Remove { image_id: ImageId },

    /// List known image types
    Types,

    /// List known versions of an image type
    Versions { image_type: String },

    /// Show an image with its binding counts
    Stats { image_id: ImageId },

    /// List the image lines that apply to an element role
    Roles { role: String },

    /// Write every image matching the filters as a JSON export
    Export {
        #[command(flatten)]
        filter: FilterArgs,

        /// Output file, standard output when omitted
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Store every image of a JSON export
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct FilterArgs {
    /// Substring of the image name
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub role: Option<String>,

    #[arg(long = "type")]
    pub image_type: Option<String>,

    #[arg(long)]
    pub state: Option<ImageState>,

    #[arg(long)]
    pub version: Option<Version>,
}

impl FilterArgs {
    pub fn into_query(self, limit: usize) -> ImageQuery {
        ImageQuery {
            name_filter: self.name,
            role: self.role,
            image_type: self.image_type,
            state: self.state,
            version: self.version,
            limit,
        }
    }
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Maximum number of images, 0 for the default page size
    #[arg(long, default_value_t = 0)]
    pub limit: usize,
}

#[derive(Subcommand, Debug)]
pub enum ElementCommand {
    /// Reconcile the images an element reports from a JSON list
    Sync {
        element: String,
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Element role used to pick between otherwise identical images
        #[arg(long)]
        role: Option<String>,
        /// Platform chipset used to pick between otherwise identical images
        #[arg(long)]
        chipset: Option<String>,
    },

    /// Show installed images with their available updates
    Images { element: String },

    /// Show the updates available for one installed image
    Updates { element: String, image_id: ImageId },

    /// Remove one cached revision from an element
    Remove {
        element: String,
        image_type: String,
        image_name: String,
        version: Version,
    },

    /// Remove the cached revisions listed in a JSON file
    Prune {
        element: String,
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_state_command() {
        let id = ImageId::random();
        let cli = Cli::try_parse_from(["fleetimg", "image", "state", &id.to_string(), "release"])
            .unwrap();
        match cli.command {
            Commands::Image(ImageCommand::State { image_id, state }) => {
                assert_eq!(image_id, id);
                assert_eq!(state, ImageState::Release);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.config, PathBuf::from("fleetimg.toml"));
    }

    #[test]
    fn test_parse_list_filters() {
        let cli = Cli::try_parse_from([
            "fleetimg",
            "--database",
            "/tmp/images.db",
            "image",
            "list",
            "--type",
            "lxd",
            "--version",
            "v1.2.3",
        ])
        .unwrap();
        assert_eq!(cli.database, Some(PathBuf::from("/tmp/images.db")));
        let Commands::Image(ImageCommand::List(args)) = cli.command else {
            panic!("expected image list");
        };
        assert_eq!(args.limit, 0);
        let query = args.filter.into_query(args.limit);
        assert_eq!(query.image_type.as_deref(), Some("lxd"));
        assert_eq!(query.version, Some(Version::new(1, 2, 3)));
    }

    #[test]
    fn test_parse_export_and_roles() {
        let cli = Cli::try_parse_from([
            "fleetimg",
            "image",
            "export",
            "--state",
            "RELEASE",
            "--output",
            "images.json",
        ])
        .unwrap();
        let Commands::Image(ImageCommand::Export { filter, output }) = cli.command else {
            panic!("expected image export");
        };
        assert_eq!(filter.state, Some(ImageState::Release));
        assert_eq!(output, Some(PathBuf::from("images.json")));

        let cli = Cli::try_parse_from(["fleetimg", "image", "roles", "SPINE"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Image(ImageCommand::Roles { role }) if role == "SPINE"
        ));
        assert!(Cli::try_parse_from(["fleetimg", "image", "export", "--limit", "5"]).is_err());
    }

    #[test]
    fn test_bad_version_is_rejected() {
        let args = ["fleetimg", "element", "remove", "spine-1", "lxd", "routing", "1.2"];
        assert!(Cli::try_parse_from(args).is_err());
    }
}
