//! Frame loop over a set of named scenes.
//!
//! The [`Framework`] owns every [`Scene`] of the process, all sharing one
//! [`SceneContext`] and therefore one component registry. Each frame:
//!
//! 1. Every registered system runs once per scene, systems in registration
//!    order and scenes in name order.
//! 2. [`Scene::update`] runs on every scene, advancing attribute
//!    interpolation and delivering queued creation notices.
//! 3. The frame counter and elapsed time advance.
//!
//! # Example
//!
//! ```
//! use strata_engine::prelude::*;
//!
//! let mut framework = Framework::new(EngineConfig::default(), ComponentRegistry::with_builtins()).unwrap();
//! framework.create_scene("main", false, true).unwrap();
//!
//! framework
//!     .add_system("spawner", |scene, _dt| {
//!         if scene.is_empty() {
//!             let _ = scene.create_local_entity(&["EC_Name"], AttributeChange::Default);
//!         }
//!     })
//!     .unwrap();
//!
//! framework.run_frames(3);
//! assert_eq!(framework.scene("main").unwrap().len(), 1);
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use strata_scene::component::ComponentRegistry;
use strata_scene::scene::{Scene, SceneContext};

use crate::config::EngineConfig;
use crate::EngineError;

// ---------------------------------------------------------------------------
// FrameDiagnostics
// ---------------------------------------------------------------------------

/// Timing diagnostics for the last frame.
#[derive(Debug, Clone, Default)]
pub struct FrameDiagnostics {
    /// Wall-clock time per system across all scenes, in execution order.
    pub system_times: Vec<(String, Duration)>,
    /// Time spent in `Scene::update`, per scene in name order.
    pub scene_update_times: Vec<(String, Duration)>,
    /// Total time for the frame.
    pub total_time: Duration,
}

// ---------------------------------------------------------------------------
// SystemFn
// ---------------------------------------------------------------------------

/// A per-frame system. Receives each scene in turn and the frame time in
/// seconds.
pub type SystemFn = Box<dyn FnMut(&mut Scene, f32)>;

struct RegisteredSystem {
    name: String,
    func: SystemFn,
}

// ---------------------------------------------------------------------------
// Framework
// ---------------------------------------------------------------------------

/// Owner of the scenes and the systems that drive them.
pub struct Framework {
    config: EngineConfig,
    context: SceneContext,
    scenes: BTreeMap<String, Scene>,
    systems: Vec<RegisteredSystem>,
    frame_counter: u64,
    /// Accumulated seconds. Frames may use a non-default time step, so this
    /// is summed rather than derived from the counter.
    elapsed: f64,
    last_diagnostics: FrameDiagnostics,
}

impl std::fmt::Debug for Framework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framework")
            .field("scenes", &self.scene_names())
            .field("systems", &self.system_names())
            .field("frame_counter", &self.frame_counter)
            .field("elapsed", &self.elapsed)
            .finish()
    }
}

impl Framework {
    /// Validate `config` and create the scenes it lists.
    pub fn new(config: EngineConfig, registry: ComponentRegistry) -> Result<Self, EngineError> {
        config.validate()?;
        let mut framework = Self {
            context: SceneContext::new(Arc::new(registry)),
            scenes: BTreeMap::new(),
            systems: Vec::new(),
            frame_counter: 0,
            elapsed: 0.0,
            last_diagnostics: FrameDiagnostics::default(),
            config,
        };
        let initial = framework.config.scenes.clone();
        for scene in &initial {
            framework.create_scene(&scene.name, scene.view_enabled, scene.authority)?;
        }
        Ok(framework)
    }

    // -- scenes -------------------------------------------------------------

    /// Create an empty scene. Fails if the name is taken.
    pub fn create_scene(&mut self, name: &str, view_enabled: bool, authority: bool) -> Result<&mut Scene, EngineError> {
        if self.scenes.contains_key(name) {
            tracing::error!(scene = name, "scene already exists");
            return Err(EngineError::DuplicateScene { name: name.to_owned() });
        }
        tracing::debug!(scene = name, view_enabled, authority, "scene created");
        let scene = Scene::new(name, self.context.clone(), view_enabled, authority);
        Ok(self.scenes.entry(name.to_owned()).or_insert(scene))
    }

    /// Remove a scene, returning it. Its entities are dropped without
    /// removal events.
    pub fn remove_scene(&mut self, name: &str) -> Result<Scene, EngineError> {
        let scene = self
            .scenes
            .remove(name)
            .ok_or_else(|| EngineError::UnknownScene { name: name.to_owned() })?;
        tracing::debug!(scene = name, entities = scene.len(), "scene removed");
        Ok(scene)
    }

    pub fn scene(&self, name: &str) -> Option<&Scene> {
        self.scenes.get(name)
    }

    pub fn scene_mut(&mut self, name: &str) -> Option<&mut Scene> {
        self.scenes.get_mut(name)
    }

    pub fn has_scene(&self, name: &str) -> bool {
        self.scenes.contains_key(name)
    }

    /// Scene names in frame order.
    pub fn scene_names(&self) -> Vec<&str> {
        self.scenes.keys().map(String::as_str).collect()
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    /// The registry shared by every scene.
    pub fn registry(&self) -> &ComponentRegistry {
        self.context.registry()
    }

    // -- systems ------------------------------------------------------------

    /// Register a system to run every frame. Systems run in registration
    /// order.
    pub fn add_system<F>(&mut self, name: &str, func: F) -> Result<(), EngineError>
    where
        F: FnMut(&mut Scene, f32) + 'static,
    {
        if self.systems.iter().any(|s| s.name == name) {
            return Err(EngineError::DuplicateSystem { name: name.to_owned() });
        }
        self.systems.push(RegisteredSystem {
            name: name.to_owned(),
            func: Box::new(func),
        });
        Ok(())
    }

    /// Unregister a system by name.
    pub fn remove_system(&mut self, name: &str) -> bool {
        let before = self.systems.len();
        self.systems.retain(|s| s.name != name);
        self.systems.len() != before
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name.as_str()).collect()
    }

    // -- frames -------------------------------------------------------------

    /// Run one frame with the configured frame time.
    pub fn frame(&mut self) {
        self.frame_with(self.config.frame_time);
    }

    /// Run one frame with an explicit time step in seconds.
    pub fn frame_with(&mut self, dt: f64) {
        let frame_start = Instant::now();
        let step = dt as f32;

        let mut system_times = Vec::with_capacity(self.systems.len());
        for system in &mut self.systems {
            let start = Instant::now();
            for scene in self.scenes.values_mut() {
                (system.func)(scene, step);
            }
            system_times.push((system.name.clone(), start.elapsed()));
        }

        let mut scene_update_times = Vec::with_capacity(self.scenes.len());
        for (name, scene) in &mut self.scenes {
            let start = Instant::now();
            scene.update(step);
            scene_update_times.push((name.clone(), start.elapsed()));
        }

        self.frame_counter += 1;
        self.elapsed += dt;
        self.last_diagnostics = FrameDiagnostics {
            system_times,
            scene_update_times,
            total_time: frame_start.elapsed(),
        };
        tracing::trace!(frame = self.frame_counter, dt, "frame complete");
    }

    /// Run `count` frames with the configured frame time.
    pub fn run_frames(&mut self, count: u64) {
        for _ in 0..count {
            self.frame();
        }
    }

    // -- accessors ----------------------------------------------------------

    pub fn frame_count(&self) -> u64 {
        self.frame_counter
    }

    /// Seconds simulated so far.
    pub fn elapsed_time(&self) -> f64 {
        self.elapsed
    }

    /// The configured seconds per frame.
    pub fn frame_time(&self) -> f64 {
        self.config.frame_time
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn last_diagnostics(&self) -> &FrameDiagnostics {
        &self.last_diagnostics
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SceneConfig;
    use std::cell::RefCell;
    use std::rc::Rc;
    use strata_scene::prelude::*;

    fn framework() -> Framework {
        Framework::new(EngineConfig::default(), ComponentRegistry::with_builtins()).unwrap()
    }

    // -- construction -------------------------------------------------------

    #[test]
    fn configured_scenes_are_created() {
        let config = EngineConfig {
            scenes: vec![
                SceneConfig::new("server"),
                SceneConfig {
                    name: "client".to_owned(),
                    view_enabled: true,
                    authority: false,
                },
            ],
            ..Default::default()
        };
        let fw = Framework::new(config, ComponentRegistry::with_builtins()).unwrap();
        assert_eq!(fw.scene_names(), vec!["client", "server"]);
        assert!(fw.scene("server").unwrap().is_authority());
        let client = fw.scene("client").unwrap();
        assert!(!client.is_authority());
        assert!(client.view_enabled());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig {
            frame_time: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(
            Framework::new(config, ComponentRegistry::new()),
            Err(EngineError::Config { .. })
        ));
    }

    #[test]
    fn scenes_share_the_registry() {
        let mut fw = framework();
        fw.create_scene("a", false, true).unwrap();
        fw.create_scene("b", false, true).unwrap();
        assert!(fw.registry().info_by_name("EC_Name").is_some());
        assert!(fw.scene("a").unwrap().registry().info_by_name("EC_Placeable").is_some());
        assert_eq!(fw.scene("b").unwrap().registry().len(), fw.registry().len());
    }

    // -- scene registry -----------------------------------------------------

    #[test]
    fn duplicate_scene_name_is_an_error() {
        let mut fw = framework();
        fw.create_scene("main", false, true).unwrap();
        let err = fw.create_scene("main", true, false).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateScene { .. }));
        assert!(!fw.scene("main").unwrap().view_enabled());
    }

    #[test]
    fn remove_scene_hands_it_back() {
        let mut fw = framework();
        fw.create_scene("main", false, true)
            .unwrap()
            .create_local_entity(&[], AttributeChange::Default)
            .unwrap();
        let scene = fw.remove_scene("main").unwrap();
        assert_eq!(scene.len(), 1);
        assert!(!fw.has_scene("main"));
        assert!(matches!(
            fw.remove_scene("main"),
            Err(EngineError::UnknownScene { .. })
        ));
    }

    // -- systems ------------------------------------------------------------

    #[test]
    fn systems_run_in_order_over_every_scene() {
        let mut fw = framework();
        fw.create_scene("b", false, true).unwrap();
        fw.create_scene("a", false, true).unwrap();

        let log = Rc::new(RefCell::new(Vec::new()));
        for name in ["first", "second"] {
            let log = Rc::clone(&log);
            fw.add_system(name, move |scene, _| log.borrow_mut().push(format!("{name}:{}", scene.name())))
                .unwrap();
        }
        fw.frame();
        assert_eq!(*log.borrow(), vec!["first:a", "first:b", "second:a", "second:b"]);
        assert_eq!(fw.system_names(), vec!["first", "second"]);
    }

    #[test]
    fn duplicate_system_name_is_an_error() {
        let mut fw = framework();
        fw.add_system("tick", |_, _| {}).unwrap();
        assert!(matches!(
            fw.add_system("tick", |_, _| {}),
            Err(EngineError::DuplicateSystem { .. })
        ));
        assert!(fw.remove_system("tick"));
        assert!(!fw.remove_system("tick"));
        assert_eq!(fw.system_count(), 0);
    }

    #[test]
    fn systems_receive_frame_time() {
        let config = EngineConfig {
            frame_time: 0.5,
            ..Default::default()
        };
        let mut fw = Framework::new(config, ComponentRegistry::with_builtins()).unwrap();
        fw.create_scene("main", false, true).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        fw.add_system("dt", move |_, dt| sink.borrow_mut().push(dt)).unwrap();
        fw.frame();
        fw.frame_with(0.25);
        assert_eq!(*seen.borrow(), vec![0.5, 0.25]);
    }

    // -- frames -------------------------------------------------------------

    #[test]
    fn frames_advance_counter_and_time() {
        let mut fw = framework();
        fw.run_frames(60);
        assert_eq!(fw.frame_count(), 60);
        assert!((fw.elapsed_time() - 1.0).abs() < 1e-9);
        fw.frame_with(0.5);
        assert!((fw.elapsed_time() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn frame_delivers_pending_creation_notices() {
        let mut fw = framework();
        let scene = fw.create_scene("main", false, true).unwrap();
        let queue = EventQueue::new();
        scene.subscribe(queue.clone());
        let id = scene
            .create_entity(EntityId::NONE, &[], AttributeChange::Default, true, true, false)
            .unwrap();
        assert!(queue.is_empty());

        fw.frame();
        assert_eq!(
            queue.drain(),
            vec![SceneEvent::EntityCreated {
                entity: id,
                change: AttributeChange::Replicate
            }]
        );
    }

    #[test]
    fn diagnostics_cover_systems_and_scenes() {
        let mut fw = framework();
        fw.create_scene("main", false, true).unwrap();
        fw.add_system("noop", |_, _| {}).unwrap();
        fw.frame();
        let diag = fw.last_diagnostics();
        assert_eq!(diag.system_times.len(), 1);
        assert_eq!(diag.system_times[0].0, "noop");
        assert_eq!(diag.scene_update_times.len(), 1);
        assert_eq!(diag.scene_update_times[0].0, "main");
    }
}
