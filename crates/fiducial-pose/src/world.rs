//! World positions of markers.
//!
//! Positions come from the config file, `--world` flags, or lines typed on
//! stdin while the loop runs. Stdin is read on a background thread and
//! forwarded over a channel, so the tracking loop never waits on a human.
//! [`BlockingWorldInput`] keeps the older prompt mode, asking only for
//! markers that have no known position yet.

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use fiducial_pose_core::WorldPosition;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WorldInputError {
    #[error("expected `x y z` or `id x y z`, got {0} fields")]
    FieldCount(usize),

    #[error("invalid coordinate `{0}`")]
    Coordinate(String),

    #[error("invalid marker id `{0}`")]
    MarkerId(String),
}

/// One position assignment. `marker_id: None` sets the default used for
/// markers without their own entry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldUpdate {
    pub marker_id: Option<u32>,
    pub position: WorldPosition,
}

fn parse_coordinate(s: &str) -> Result<f64, WorldInputError> {
    s.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| WorldInputError::Coordinate(s.to_string()))
}

fn parse_marker_id(s: &str) -> Result<u32, WorldInputError> {
    s.parse::<u32>()
        .map_err(|_| WorldInputError::MarkerId(s.to_string()))
}

fn parse_xyz(fields: &[&str]) -> Result<WorldPosition, WorldInputError> {
    match fields {
        [x, y, z] => Ok(WorldPosition::new(
            parse_coordinate(x)?,
            parse_coordinate(y)?,
            parse_coordinate(z)?,
        )),
        _ => Err(WorldInputError::FieldCount(fields.len())),
    }
}

impl WorldUpdate {
    /// Parse a stdin line: `x y z` or `id x y z`, separated by spaces or commas.
    pub fn parse_line(line: &str) -> Result<Self, WorldInputError> {
        let fields: Vec<&str> = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|f| !f.is_empty())
            .collect();
        match fields.as_slice() {
            [id, rest @ ..] if rest.len() == 3 => Ok(Self {
                marker_id: Some(parse_marker_id(id)?),
                position: parse_xyz(rest)?,
            }),
            _ => Ok(Self {
                marker_id: None,
                position: parse_xyz(&fields)?,
            }),
        }
    }

    /// Parse a command-line value: `ID:X,Y,Z` or `X,Y,Z`.
    pub fn parse_flag(s: &str) -> Result<Self, WorldInputError> {
        let (marker_id, xyz) = match s.split_once(':') {
            Some((id, xyz)) => (Some(parse_marker_id(id.trim())?), xyz),
            None => (None, s),
        };
        let fields: Vec<&str> = xyz.split(',').map(str::trim).collect();
        Ok(Self {
            marker_id,
            position: parse_xyz(&fields)?,
        })
    }
}

impl FromStr for WorldUpdate {
    type Err = WorldInputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_line(s)
    }
}

/// Known marker positions in the world frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldPositions {
    /// Used for any marker without its own entry.
    #[serde(default)]
    pub default: Option<WorldPosition>,
    #[serde(default)]
    pub markers: BTreeMap<u32, WorldPosition>,
}

impl WorldPositions {
    pub fn apply(&mut self, update: WorldUpdate) {
        match update.marker_id {
            Some(id) => {
                self.markers.insert(id, update.position);
            }
            None => self.default = Some(update.position),
        }
    }

    /// Marker-specific position first, then the default.
    pub fn get(&self, marker_id: u32) -> Option<WorldPosition> {
        self.markers.get(&marker_id).copied().or(self.default)
    }

    pub fn is_empty(&self) -> bool {
        self.default.is_none() && self.markers.is_empty()
    }
}

/// Supplies the world position of a detected marker, if one is known.
pub trait WorldPositionProvider {
    fn world_position(&mut self, marker_id: u32) -> Option<WorldPosition>;
}

impl WorldPositionProvider for WorldPositions {
    fn world_position(&mut self, marker_id: u32) -> Option<WorldPosition> {
        self.get(marker_id)
    }
}

/// Read world updates line by line on a background thread.
///
/// Malformed lines are logged and skipped. The thread exits at end of input or
/// once the receiver is dropped.
pub fn spawn_line_reader<R>(reader: R) -> io::Result<Receiver<WorldUpdate>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("world-input".to_string())
        .spawn(move || {
            for (n, line) in reader.lines().enumerate() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        warn!("world input closed: {err}");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match WorldUpdate::parse_line(&line) {
                    Ok(update) => {
                        if tx.send(update).is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!("ignoring world input line {}: {err}", n + 1),
                }
            }
            debug!("world input reader finished");
        })?;
    Ok(rx)
}

/// [`spawn_line_reader`] on the process stdin.
pub fn spawn_stdin_reader() -> io::Result<Receiver<WorldUpdate>> {
    spawn_line_reader(io::BufReader::new(io::stdin()))
}

/// Positions that can be updated while the loop runs.
pub struct LiveWorldPositions {
    positions: WorldPositions,
    updates: Option<Receiver<WorldUpdate>>,
}

impl LiveWorldPositions {
    pub fn new(positions: WorldPositions, updates: Option<Receiver<WorldUpdate>>) -> Self {
        Self { positions, updates }
    }

    pub fn positions(&self) -> &WorldPositions {
        &self.positions
    }

    /// Apply every pending update without blocking. Returns how many were applied.
    pub fn drain(&mut self) -> usize {
        let Some(rx) = self.updates.as_ref() else {
            return 0;
        };
        let mut applied = 0;
        loop {
            match rx.try_recv() {
                Ok(update) => {
                    let p = update.position;
                    match update.marker_id {
                        Some(id) => info!("marker {id} world position: {} {} {}", p.x, p.y, p.z),
                        None => info!("default world position: {} {} {}", p.x, p.y, p.z),
                    }
                    self.positions.apply(update);
                    applied += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.updates = None;
                    break;
                }
            }
        }
        applied
    }
}

impl WorldPositionProvider for LiveWorldPositions {
    fn world_position(&mut self, marker_id: u32) -> Option<WorldPosition> {
        self.drain();
        self.positions.get(marker_id)
    }
}

/// Prompt on stderr for markers whose world position is still unknown.
///
/// Positions from flags or config are answered without prompting. An answer
/// of `x y z` is stored for the prompted marker, `id x y z` for the marker it
/// names. Once the input is closed no further prompts are shown.
pub struct BlockingWorldInput<R> {
    positions: WorldPositions,
    reader: R,
    closed: bool,
}

impl<R: BufRead> BlockingWorldInput<R> {
    pub fn new(positions: WorldPositions, reader: R) -> Self {
        Self {
            positions,
            reader,
            closed: false,
        }
    }

    pub fn positions(&self) -> &WorldPositions {
        &self.positions
    }

    fn prompt(&mut self, marker_id: u32) -> Option<WorldUpdate> {
        eprint!("world position of marker {marker_id} ([id] x y z): ");
        let _ = io::stderr().flush();

        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => {
                warn!("world input closed");
                self.closed = true;
                None
            }
            Ok(_) if line.trim().is_empty() => None,
            Ok(_) => match WorldUpdate::parse_line(&line) {
                Ok(update) => Some(update),
                Err(err) => {
                    warn!("ignoring world input: {err}");
                    None
                }
            },
            Err(err) => {
                warn!("failed to read world input: {err}");
                self.closed = true;
                None
            }
        }
    }
}

impl<R: BufRead> WorldPositionProvider for BlockingWorldInput<R> {
    fn world_position(&mut self, marker_id: u32) -> Option<WorldPosition> {
        if let Some(position) = self.positions.get(marker_id) {
            return Some(position);
        }
        if self.closed {
            return None;
        }
        let update = self.prompt(marker_id)?;
        let id = update.marker_id.unwrap_or(marker_id);
        debug!("world position of marker {id} set to {:?}", update.position);
        self.positions.markers.insert(id, update.position);
        self.positions.get(marker_id)
    }
}
