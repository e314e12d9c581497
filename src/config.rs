use crate::calc::InvalidOperandPolicy;
use crate::model::Tuning;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Settings {
    pub(crate) fps_cap: u32,
    pub(crate) enable_color: bool,
    pub(crate) enable_braille: bool,
    /// Respawn-gap seed; `None` seeds from the OS.
    pub(crate) seed: Option<u64>,
    pub(crate) invalid_operand: InvalidOperandPolicy,
    pub(crate) tuning: Tuning,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fps_cap: 60,
            enable_color: true,
            enable_braille: true,
            seed: None,
            invalid_operand: InvalidOperandPolicy::Zero,
            tuning: Tuning::default(),
        }
    }
}

impl Settings {
    fn sanitize(mut self) -> Self {
        let fps = self.fps_cap.clamp(10, 240);
        if fps != self.fps_cap {
            warn!(requested = self.fps_cap, using = fps, "fps_cap out of range");
            self.fps_cap = fps;
        }
        for field in self.tuning.sanitize() {
            warn!(field, "invalid tuning value replaced by default");
        }
        self
    }
}

pub(crate) struct Paths {
    pub(crate) settings_path: PathBuf,
    pub(crate) log_path: PathBuf,
}

pub(crate) fn project_paths() -> Result<Paths> {
    let proj = ProjectDirs::from("com", "actioncalc", "ActionCalc")
        .context("could not resolve project directories")?;
    let dir = proj.data_local_dir().to_path_buf();
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    Ok(Paths {
        settings_path: dir.join("settings.json"),
        log_path: dir.join("actioncalc.log"),
    })
}

/// Never fails: a missing or broken file means defaults. A broken file is
/// moved to `settings.json.bak` so the save on exit cannot destroy it.
pub(crate) fn load_settings(path: &Path) -> Settings {
    let text = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => {
            info!(path = %path.display(), "no settings file, using defaults");
            return Settings::default();
        }
    };
    match serde_json::from_str::<Settings>(&text) {
        Ok(s) => s.sanitize(),
        Err(err) => {
            let backup = path.with_extension("json.bak");
            match atomic_rename(path, &backup) {
                Ok(()) => warn!(
                    path = %path.display(),
                    backup = %backup.display(),
                    %err,
                    "unreadable settings moved aside, using defaults"
                ),
                Err(move_err) => warn!(
                    path = %path.display(),
                    %err,
                    %move_err,
                    "unreadable settings, using defaults"
                ),
            }
            Settings::default()
        }
    }
}

pub(crate) fn save_settings_atomic(path: &Path, s: &Settings) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(s)?;
    fs::write(&tmp, data).with_context(|| format!("writing {}", tmp.display()))?;
    atomic_rename(&tmp, path)?;
    Ok(())
}

pub(crate) fn atomic_rename(from: &Path, to: &Path) -> Result<()> {
    // rename-over-existing is not atomic on Windows
    if to.exists() {
        let _ = fs::remove_file(to);
    }
    fs::rename(from, to).with_context(|| format!("renaming to {}", to.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("actioncalc-{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = scratch_dir("missing");
        assert_eq!(load_settings(&dir.join("nope.json")), Settings::default());
    }

    #[test]
    fn garbage_file_gives_defaults() {
        let dir = scratch_dir("garbage");
        let path = dir.join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_settings(&path), Settings::default());
    }

    #[test]
    fn broken_file_survives_the_exit_save() {
        let dir = scratch_dir("stray-comma");
        let path = dir.join("settings.json");
        let edited = r#"{"fps_cap": 120, "seed": 7,}"#;
        fs::write(&path, edited).unwrap();

        let s = load_settings(&path);
        assert_eq!(s, Settings::default());
        save_settings_atomic(&path, &s).unwrap();

        let backup = fs::read_to_string(path.with_extension("json.bak")).unwrap();
        assert_eq!(backup, edited);
        assert_eq!(load_settings(&path), Settings::default());
    }

    #[test]
    fn overflowing_gap_is_repaired_before_the_engine_sees_it() {
        use crate::model::TickEvent;
        use crate::sim::Engine;
        use rand::rngs::mock::StepRng;

        let dir = scratch_dir("gap");
        let path = dir.join("settings.json");
        fs::write(&path, r#"{"tuning":{"respawn_gap":{"min":3e38,"range":3e38}}}"#).unwrap();
        let s = load_settings(&path);
        assert_eq!(s.tuning.respawn_gap, Tuning::default().respawn_gap);

        let mut e = Engine::new(s.tuning, 640.0, StepRng::new(0, 0));
        e.obstacle.x = -76.0;
        assert_eq!(e.advance(), vec![TickEvent::Scored]);
        assert!(e.obstacle.x.is_finite() && e.obstacle.x >= 740.0);
    }

    #[test]
    fn save_then_load_keeps_edits() {
        let dir = scratch_dir("roundtrip");
        let path = dir.join("settings.json");
        let mut s = Settings::default();
        s.seed = Some(42);
        s.invalid_operand = InvalidOperandPolicy::PropagateError;
        s.tuning.gravity = 0.9;
        save_settings_atomic(&path, &s).unwrap();
        save_settings_atomic(&path, &s).unwrap();
        assert_eq!(load_settings(&path), s);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn policy_is_snake_case_and_fps_is_clamped() {
        let dir = scratch_dir("policy");
        let path = dir.join("settings.json");
        fs::write(&path, r#"{"invalid_operand": "propagate_error", "fps_cap": 1000}"#).unwrap();
        let s = load_settings(&path);
        assert_eq!(s.invalid_operand, InvalidOperandPolicy::PropagateError);
        assert_eq!(s.fps_cap, 240);
        assert!(s.enable_braille);
    }
}
