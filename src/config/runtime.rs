use std::path::PathBuf;

/// Process-level settings for one run of the simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    /// TOML configuration file; defaults apply when absent
    pub config_path: Option<PathBuf>,
    /// World initialization document
    pub world_path: PathBuf,
    /// Number of turns to run
    pub steps: u64,
    /// Resume this simulation instead of creating a new one
    pub simulation_id: Option<String>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            config_path: None,
            world_path: PathBuf::from("world_init.json"),
            steps: 5,
            simulation_id: None,
        }
    }
}

impl RunSettings {
    /// Build from env vars, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        if let Some(v) = lookup("TURNSIM_CONFIG") {
            settings.config_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("TURNSIM_WORLD") {
            settings.world_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("TURNSIM_STEPS") {
            if let Ok(n) = v.parse::<u64>() {
                settings.steps = n;
            }
        }
        if let Some(v) = lookup("TURNSIM_SIMULATION_ID") {
            if !v.is_empty() {
                settings.simulation_id = Some(v);
            }
        }

        settings
    }
}
