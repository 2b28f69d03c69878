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
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{builtin, Context, EffectDescriptor, EffectInfo, ValidationError};
use crate::cache::{self, Cache};
use crate::renderer::{NullSink, Renderer};
use crate::setup::Setup;

const CACHE_SECTION: &str = "effects";

/// The set of effects an engine can choose from, in listing order.
#[derive(Clone, Debug, Default)]
pub struct EffectRegistry {
    descriptors: Vec<EffectDescriptor>,
}

impl EffectRegistry {
    pub fn new(descriptors: Vec<EffectDescriptor>) -> EffectRegistry {
        let mut registry = EffectRegistry::default();
        descriptors
            .into_iter()
            .for_each(|descriptor| registry.register(descriptor));
        registry
    }

    /// Every effect that ships with the crate.
    pub fn builtin() -> EffectRegistry {
        EffectRegistry::new(builtin::descriptors())
    }

    /// Adds a descriptor. A descriptor with the same key is replaced.
    pub fn register(&mut self, descriptor: EffectDescriptor) {
        match self
            .descriptors
            .iter_mut()
            .find(|existing| existing.key == descriptor.key)
        {
            Some(existing) => {
                warn!(effect = descriptor.key, "Replacing registered effect");
                *existing = descriptor;
            }
            None => self.descriptors.push(descriptor),
        }
    }

    pub fn get(&self, key: &str) -> Option<&EffectDescriptor> {
        self.descriptors
            .iter()
            .find(|descriptor| descriptor.key == key)
    }

    pub fn first(&self) -> Option<&EffectDescriptor> {
        self.descriptors.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EffectDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn list(&self) -> Vec<EffectInfo> {
        self.descriptors.iter().map(EffectInfo::from).collect()
    }

    /// Builds the effect against `setup` and runs a single update into a renderer that
    /// discards its output. The pause the update asks for is ignored.
    pub fn validate(descriptor: &EffectDescriptor, setup: Arc<Setup>) -> Result<(), ValidationError> {
        let renderer = Renderer::new(setup.led_count(), Box::new(NullSink));

        let wrap = |source| ValidationError {
            key: descriptor.key.clone(),
            source,
        };
        let mut effect = descriptor.build(setup).map_err(wrap)?;
        effect
            .update(&Context::new(&renderer))
            .map_err(wrap)
    }

    /// Returns the registry restricted to effects that validate against `setup`. Effects
    /// whose fingerprint is already in the cache are trusted without running them.
    pub fn validated(&self, setup: &Arc<Setup>, cache: Option<&Cache>) -> EffectRegistry {
        let mut valid = Vec::with_capacity(self.descriptors.len());
        for descriptor in &self.descriptors {
            if !descriptor.compatibility.supports(setup.dimensionality()) {
                info!(
                    effect = descriptor.key,
                    dimensionality = %setup.dimensionality(),
                    "Effect does not support this setup, hiding it."
                );
                continue;
            }

            let fingerprint = fingerprint(descriptor, setup).to_string();
            let cached = cache
                .and_then(|cache| cache.get_by_name(CACHE_SECTION, &descriptor.key))
                .is_some_and(|stored| stored == fingerprint);
            if cached {
                debug!(effect = descriptor.key, "Effect validation cached.");
                valid.push(descriptor.clone());
                continue;
            }

            match EffectRegistry::validate(descriptor, setup.clone()) {
                Ok(()) => {
                    if let Some(cache) = cache {
                        if let Err(e) =
                            cache.set_by_name(CACHE_SECTION, &descriptor.key, &fingerprint)
                        {
                            warn!(err = %e, effect = descriptor.key, "Unable to cache validation result");
                        }
                    }
                    valid.push(descriptor.clone());
                }
                Err(e) => warn!(err = %e, "Effect failed validation, hiding it."),
            }
        }

        EffectRegistry { descriptors: valid }
    }
}

/// Identifies an effect build: its identity, its parameter definitions, the crate version
/// and the geometry it was validated against.
fn fingerprint(descriptor: &EffectDescriptor, setup: &Setup) -> u64 {
    let parameters = (descriptor.constructor)(Arc::new(setup.clone()))
        .parameters()
        .describe();
    let identity = format!(
        "{}|{}|{}|{}|{}|{}|{:?}",
        env!("CARGO_PKG_VERSION"),
        descriptor.key,
        descriptor.display_name,
        descriptor.compatibility,
        setup.name(),
        setup.led_count(),
        parameters,
    );
    cache::fingerprint(identity.as_bytes())
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::effect::{Compatibility, Effect, EffectError, Parameters};
    use crate::testutil::{column_setup, row_setup};

    static BUILDS: AtomicUsize = AtomicUsize::new(0);

    struct Broken {
        parameters: Parameters,
    }

    impl Effect for Broken {
        fn parameters(&self) -> &Parameters {
            &self.parameters
        }

        fn parameters_mut(&mut self) -> &mut Parameters {
            &mut self.parameters
        }

        fn update(&mut self, _: &Context<'_>) -> Result<(), EffectError> {
            Err(EffectError::Failed("always broken".to_string()))
        }
    }

    fn broken(_: Arc<Setup>) -> Box<dyn Effect> {
        Box::new(Broken {
            parameters: Parameters::new(),
        })
    }

    struct Counted {
        parameters: Parameters,
    }

    impl Effect for Counted {
        fn parameters(&self) -> &Parameters {
            &self.parameters
        }

        fn parameters_mut(&mut self) -> &mut Parameters {
            &mut self.parameters
        }

        fn update(&mut self, _: &Context<'_>) -> Result<(), EffectError> {
            BUILDS.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn counted(_: Arc<Setup>) -> Box<dyn Effect> {
        Box::new(Counted {
            parameters: Parameters::new(),
        })
    }

    struct Quiet {
        parameters: Parameters,
    }

    impl Effect for Quiet {
        fn parameters(&self) -> &Parameters {
            &self.parameters
        }

        fn parameters_mut(&mut self) -> &mut Parameters {
            &mut self.parameters
        }

        fn update(&mut self, _: &Context<'_>) -> Result<(), EffectError> {
            Ok(())
        }
    }

    fn quiet(_: Arc<Setup>) -> Box<dyn Effect> {
        Box::new(Quiet {
            parameters: Parameters::new(),
        })
    }

    #[test]
    fn test_builtins_validate() {
        let registry = EffectRegistry::builtin();
        let setup = column_setup(30);
        for descriptor in registry.iter() {
            if let Err(e) = EffectRegistry::validate(descriptor, setup.clone()) {
                panic!("{}", e);
            }
        }
        assert_eq!(registry.len(), registry.validated(&setup, None).len());
    }

    #[test]
    fn test_validation_hides_broken_and_incompatible() {
        let registry = EffectRegistry::new(vec![
            EffectDescriptor::new("broken", "Broken", Compatibility::Universal, broken),
            EffectDescriptor::new("volume", "Volume", Compatibility::Only3D, quiet),
            EffectDescriptor::new("plane", "Plane", Compatibility::Universal, quiet),
        ]);

        let valid = registry.validated(&row_setup(4), None);
        let keys: Vec<String> = valid.iter().map(|d| d.key.clone()).collect();
        assert_eq!(vec!["plane".to_string()], keys);
    }

    #[test]
    fn test_validation_cache_skips_runs() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let cache = Cache::new(dir.path());
        let registry = EffectRegistry::new(vec![EffectDescriptor::new(
            "counted",
            "Counted",
            Compatibility::Universal,
            counted,
        )]);
        let setup = column_setup(3);

        let before = BUILDS.load(Ordering::SeqCst);
        assert_eq!(1, registry.validated(&setup, Some(&cache)).len());
        assert_eq!(before + 1, BUILDS.load(Ordering::SeqCst));
        assert_eq!(1, registry.validated(&setup, Some(&cache)).len());
        assert_eq!(before + 1, BUILDS.load(Ordering::SeqCst));
        Ok(())
    }

    #[test]
    fn test_register_replaces_by_key() {
        let mut registry = EffectRegistry::builtin();
        let count = registry.len();
        registry.register(EffectDescriptor::new(
            "rainbow",
            "My Rainbow",
            Compatibility::Universal,
            quiet,
        ));
        assert_eq!(count, registry.len());
        assert_eq!(
            Some("My Rainbow"),
            registry.get("rainbow").map(|d| d.display_name.as_str())
        );
    }
}
