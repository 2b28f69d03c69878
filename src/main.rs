// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{crate_version, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ledstage::audio;
use ledstage::color::Rgb;
use ledstage::config::{self, lightshow::LightshowFile, setup::SetupFile};
use ledstage::control::console::Console;
use ledstage::effect::EffectRegistry;
use ledstage::lightshow::{self, LightshowRegistry};
use ledstage::setup::SetupRepository;
use ledstage::util;

const SYSTEMD_SERVICE: &str = r#"
[Unit]
Description=LED installation controller

[Service]
Type=simple
Restart=on-failure
EnvironmentFile=-/etc/default/ledstage
ExecStart=/usr/local/bin/ledstage start "$LEDSTAGE_CONFIG"
ExecReload=/bin/kill -HUP $MAINPID

[Install]
WantedBy=multi-user.target
Alias=ledstage.service
"#;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Drives addressable LED installations."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Starts the controller and reads commands from the console.
    Start {
        /// The path to the host config.
        host_path: String,
    },
    /// Lists the built-in effects.
    Effects {},
    /// Lists the lightshow effects and filters.
    LightshowEffects {},
    /// Lists the setups in the given directory.
    Setups {
        /// The path to the setups directory.
        path: String,
    },
    /// Compiles a lightshow and prints statistics about the result.
    Compile {
        /// The path to the lightshow file.
        lightshow_path: String,
        /// The path to the setup file to compile against.
        #[arg(short, long)]
        setup: String,
        /// Frames per second.
        #[arg(short, long, default_value_t = 30.0)]
        fps: f64,
        /// Length in seconds. Measured from the show's audio file when omitted.
        #[arg(short, long)]
        length: Option<f64>,
        /// Where the show's audio file lives.
        #[arg(short, long, default_value = "audio")]
        audio_dir: String,
    },
    /// Prints a systemd service definition to stdout.
    Systemd {},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { host_path } => {
            let controller = config::init_controller(&PathBuf::from(host_path))?;
            let mut console = Console::new(controller.clone()).spawn();

            tokio::select! {
                result = &mut console => {
                    if let Err(e) = result? {
                        error!(err = %e, "Console failed");
                    }
                }
                result = tokio::signal::ctrl_c() => {
                    result?;
                    info!("Interrupted.");
                }
            }
            controller.shutdown();
        }
        Commands::Effects {} => {
            let registry = EffectRegistry::builtin();
            println!("Effects (count: {}):", registry.len());
            for info in registry.list() {
                println!("- {} ({}): {}", info.key, info.compatibility, info.display_name);
            }
        }
        Commands::LightshowEffects {} => {
            let registry = LightshowRegistry::builtin();
            println!("Lightshow effects:");
            for info in registry.list() {
                println!("- {} ({})", info.key, info.compatibility);
            }
            println!("\nFilters:");
            for key in registry.filter_keys() {
                println!("- {}", key);
            }
        }
        Commands::Setups { path } => {
            let repository = SetupRepository::new(Path::new(&path));
            let names = repository.list()?;
            if names.is_empty() {
                println!("No setups found in {}.", path);
                return Ok(());
            }

            println!("Setups (count: {}):", names.len());
            for name in names {
                match repository.load(&name) {
                    Ok(setup) => println!("- {}", setup),
                    Err(e) => println!("- {} (invalid: {})", name, e),
                }
            }
        }
        Commands::Compile {
            lightshow_path,
            setup,
            fps,
            length,
            audio_dir,
        } => {
            let document = LightshowFile::read(Path::new(&lightshow_path))?.to_document()?;
            let setup_path = PathBuf::from(&setup);
            let setup = SetupFile::read(&setup_path)?
                .to_setup(util::file_stem(util::filename_display(&setup_path)))?;
            let length = match length {
                Some(length) => length,
                None => audio::duration(&Path::new(&audio_dir).join(document.audio_file()))?
                    .as_secs_f64(),
            };

            let frames = lightshow::compile(
                &document,
                &setup,
                &LightshowRegistry::builtin(),
                fps,
                length,
            )?;
            let lit = frames
                .iter()
                .filter(|frame| frame.iter().any(|pixel| *pixel != Rgb::BLACK))
                .count();
            println!(
                "{}: {} frames at {} fps for {} ({} items, {} frames lit)",
                lightshow_path,
                frames.len(),
                fps,
                setup,
                document.items().len(),
                lit
            );
        }
        Commands::Systemd {} => {
            println!("{}", SYSTEMD_SERVICE)
        }
    }

    Ok(())
}
