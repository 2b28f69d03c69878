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
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::control::Controller;
use crate::renderer::{NullSink, SimulatorSink, Sink};

pub mod error;
pub mod host;
pub mod lightshow;
pub mod sandbox;
pub mod setup;
pub mod store;

pub use self::error::ConfigError;
pub use self::host::Host;
pub use self::store::{PerformanceMode, State, StateStore};

/// Builds the controller from the host configuration at `path`. The state store,
/// output sink and every engine are created here.
pub fn init_controller(path: &Path) -> Result<Arc<Controller>, Box<dyn Error>> {
    let host = Host::deserialize(path)?;
    let fresh = !host.state_file().exists();
    let store = Arc::new(StateStore::open(&host.state_file())?);
    if fresh {
        store.update(|s| s.brightness = host.brightness())?;
    }

    let sink: Box<dyn Sink> = match host.simulator_address()? {
        Some(address) => Box::new(SimulatorSink::bind(address)?),
        None => {
            info!("Frames will be discarded.");
            Box::new(NullSink)
        }
    };

    Ok(Arc::new(Controller::new(&host, store, sink)?))
}
