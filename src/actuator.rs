#![warn(clippy::pedantic)]

use std::path::{Path, PathBuf};
use std::{fs, io};

/// The actuator-side view of the system: the deformable-mirror parameter
/// list (focus is element 0) and the dazzler's two spectral-phase orders.
/// This struct is the single owner of those values; the optimizer core never
/// touches the parameter files itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorState {
    mirror: Vec<i32>,
    order2: i32,
    order3: i32,
}

impl ActuatorState {
    /// Parse the two flat parameter files: the mirror file is
    /// whitespace-separated integers, the dazzler file holds
    /// `order2 = <int>` and `order3 = <int>` lines.
    /// # Errors
    /// Returns a description of the first malformed or missing field.
    pub fn parse(mirror_text: &str, dazzler_text: &str) -> Result<Self, String> {
        let mirror = mirror_text
            .split_whitespace()
            .map(|tok| {
                tok.parse::<i32>()
                    .map_err(|_| format!("bad mirror parameter '{tok}'"))
            })
            .collect::<Result<Vec<i32>, String>>()?;
        if mirror.is_empty() {
            return Err("mirror parameter file holds no values".into());
        }

        let mut order2 = None;
        let mut order3 = None;
        for line in dazzler_text.lines() {
            let mut parts = line.splitn(2, '=');
            let key = parts.next().unwrap_or_default().trim();
            let Some(raw) = parts.next() else { continue };
            let val = raw
                .trim()
                .parse::<i32>()
                .map_err(|_| format!("bad dazzler value in line '{line}'"))?;
            match key {
                "order2" => order2 = Some(val),
                "order3" => order3 = Some(val),
                _ => {}
            }
        }
        Ok(ActuatorState {
            mirror,
            order2: order2.ok_or("dazzler parameter file is missing order2")?,
            order3: order3.ok_or("dazzler parameter file is missing order3")?,
        })
    }

    #[inline]
    #[must_use]
    pub fn focus(&self) -> i32 {
        self.mirror[0]
    }

    #[inline]
    #[must_use]
    pub fn order2(&self) -> i32 {
        self.order2
    }

    #[inline]
    #[must_use]
    pub fn order3(&self) -> i32 {
        self.order3
    }

    pub fn set(&mut self, focus: i32, order2: i32, order3: i32) {
        self.mirror[0] = focus;
        self.order2 = order2;
        self.order3 = order3;
    }

    /// Render the mirror file contents (all parameters, space separated).
    #[must_use]
    pub fn mirror_line(&self) -> String {
        self.mirror
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<String>>()
            .join(" ")
    }

    /// Render the dazzler file contents.
    #[must_use]
    pub fn dazzler_lines(&self) -> String {
        format!("order2 = {}\norder3 = {}\n", self.order2, self.order3)
    }
}

/// File-backed sink: owns the state plus the paths of the two parameter
/// files the mirror and dazzler machines consume.
#[derive(Debug)]
pub struct ActuatorFiles {
    pub state: ActuatorState,
    mirror_path: PathBuf,
    dazzler_path: PathBuf,
}

impl ActuatorFiles {
    /// Read and parse both parameter files.
    /// # Errors
    /// Returns a message naming the file that failed to read or parse.
    pub fn load(mirror_path: &Path, dazzler_path: &Path) -> Result<Self, String> {
        let mirror_text = fs::read_to_string(mirror_path)
            .map_err(|e| format!("failed to read {}: {e}", mirror_path.display()))?;
        let dazzler_text = fs::read_to_string(dazzler_path)
            .map_err(|e| format!("failed to read {}: {e}", dazzler_path.display()))?;
        Ok(ActuatorFiles {
            state: ActuatorState::parse(&mirror_text, &dazzler_text)?,
            mirror_path: mirror_path.into(),
            dazzler_path: dazzler_path.into(),
        })
    }

    /// Write the triple back to both files. Idempotent: persisting an
    /// unchanged triple rewrites identical bytes, so frozen tracks may call
    /// this every tick.
    /// # Errors
    /// Propagates the underlying filesystem error.
    pub fn persist(&mut self, focus: i32, order2: i32, order3: i32) -> io::Result<()> {
        self.state.set(focus, order2, order3);
        fs::write(&self.mirror_path, self.state.mirror_line())?;
        fs::write(&self.dazzler_path, self.state.dazzler_lines())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_formats() {
        let state =
            ActuatorState::parse("-150 3 17 0", "order2 = 36100\norder3 = -27000\n").unwrap();
        assert_eq!(state.focus(), -150);
        assert_eq!(state.order2(), 36_100);
        assert_eq!(state.order3(), -27_000);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(ActuatorState::parse("", "order2 = 1\norder3 = 2\n").is_err());
        assert!(ActuatorState::parse("12 abc", "order2 = 1\norder3 = 2\n").is_err());
        assert!(ActuatorState::parse("12", "order2 = 1\n").is_err());
        assert!(ActuatorState::parse("12", "order2 = x\norder3 = 2\n").is_err());
    }

    #[test]
    fn render_roundtrips() {
        let mirror = "-150 3 17 0";
        let dazzler = "order2 = 36100\norder3 = -27000\n";
        let state = ActuatorState::parse(mirror, dazzler).unwrap();
        assert_eq!(state.mirror_line(), mirror);
        assert_eq!(state.dazzler_lines(), dazzler);
        let reparsed = ActuatorState::parse(&state.mirror_line(), &state.dazzler_lines()).unwrap();
        assert_eq!(reparsed, state);
    }

    #[test]
    fn set_preserves_trailing_mirror_parameters() {
        let mut state =
            ActuatorState::parse("-150 3 17 0", "order2 = 36100\norder3 = -27000\n").unwrap();
        state.set(-149, 36_099, -26_999);
        assert_eq!(state.mirror_line(), "-149 3 17 0");
        assert_eq!(state.dazzler_lines(), "order2 = 36099\norder3 = -26999\n");
    }

    #[test]
    fn persist_rewrites_both_files_on_disk() {
        let dir = std::env::temp_dir().join(format!("rustatron_actuator_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let mirror = dir.join("dm_parameters.txt");
        let dazzler = dir.join("dazzler_parameters.txt");
        fs::write(&mirror, "-150 3 17 0").unwrap();
        fs::write(&dazzler, "order2 = 36100\norder3 = -27000\n").unwrap();

        let mut files = ActuatorFiles::load(&mirror, &dazzler).unwrap();
        files.persist(-149, 36_099, -26_999).unwrap();
        let first = (
            fs::read_to_string(&mirror).unwrap(),
            fs::read_to_string(&dazzler).unwrap(),
        );
        assert_eq!(first.0, "-149 3 17 0");
        assert_eq!(first.1, "order2 = 36099\norder3 = -26999\n");

        // persisting the same triple again leaves identical bytes
        files.persist(-149, 36_099, -26_999).unwrap();
        let second = (
            fs::read_to_string(&mirror).unwrap(),
            fs::read_to_string(&dazzler).unwrap(),
        );
        assert_eq!(second, first);

        let reloaded = ActuatorFiles::load(&mirror, &dazzler).unwrap();
        assert_eq!(reloaded.state, files.state);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn persisting_unchanged_triple_is_idempotent() {
        let mut state =
            ActuatorState::parse("-150", "order2 = 36100\norder3 = -27000\n").unwrap();
        state.set(-149, 36_099, -26_999);
        let first = (state.mirror_line(), state.dazzler_lines());
        state.set(-149, 36_099, -26_999);
        assert_eq!((state.mirror_line(), state.dazzler_lines()), first);
    }
}
