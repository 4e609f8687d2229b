//! Move request -> two-waypoint actuator command
//!
//! A waypoint goes over the wire as ASCII `channel,angle,speed` (e.g. `7,90,100`).
//! Every command is a pair of waypoints sent back to back.

use crate::error::MotorError;
use bytes::Bytes;
use pantrack_core::{CommandConfig, MoveRequest, SecondWaypoint};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Waypoint {
    pub channel: u8,
    pub angle: i32,
    pub speed: u32,
}

impl Waypoint {
    pub fn new(channel: u8, angle: i32, speed: u32) -> Self {
        Self { channel, angle, speed }
    }

    pub fn encode(&self) -> String {
        format!("{},{},{}", self.channel, self.angle, self.speed)
    }
}

impl fmt::Display for Waypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Waypoint {
    type Err = MotorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(MotorError::Command(format!(
                "expected channel,angle,speed but got '{}'",
                s
            )));
        }
        let bad = |field: &str| MotorError::Command(format!("invalid {} in waypoint '{}'", field, s));
        Ok(Self {
            channel: parts[0].parse().map_err(|_| bad("channel"))?,
            angle: parts[1].parse().map_err(|_| bad("angle"))?,
            speed: parts[2].parse().map_err(|_| bad("speed"))?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorCommand {
    pub first: Waypoint,
    pub second: Waypoint,
}

impl ActuatorCommand {
    pub fn new(first: Waypoint, second: Waypoint) -> Self {
        Self { first, second }
    }

    /// Wire frames in send order, each followed by `terminator`
    pub fn frames(&self, terminator: &str) -> [Bytes; 2] {
        [
            Bytes::from(format!("{}{}", self.first.encode(), terminator)),
            Bytes::from(format!("{}{}", self.second.encode(), terminator)),
        ]
    }
}

impl fmt::Display for ActuatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} -> {}]", self.first, self.second)
    }
}

/// Maps a move request's x coordinate onto the pan range
#[derive(Debug, Clone)]
pub struct CommandMapper {
    config: CommandConfig,
}

impl CommandMapper {
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CommandConfig {
        &self.config
    }

    /// Linear map of `x` in `[0, frame_width]` to `[min_angle, max_angle]`.
    /// Out-of-frame x is clamped to the nearest edge.
    pub fn angle_for_x(&self, x: i32) -> i32 {
        let width = self.config.frame_width.max(1) as f64;
        let fraction = (x as f64).clamp(0.0, width) / width;
        let span = (self.config.max_angle - self.config.min_angle) as f64;
        (self.config.min_angle as f64 + fraction * span).round() as i32
    }

    pub fn command_for(&self, request: &MoveRequest) -> ActuatorCommand {
        let angle = self.angle_for_x(request.x);
        let second_angle = match self.config.second_waypoint {
            SecondWaypoint::Mirror => -angle,
            SecondWaypoint::Hold => angle,
            SecondWaypoint::Home(home) => home,
        };
        ActuatorCommand::new(
            Waypoint::new(self.config.channel, angle, self.config.speed),
            Waypoint::new(self.config.channel, second_angle, self.config.speed),
        )
    }
}

impl From<&CommandConfig> for CommandMapper {
    fn from(config: &CommandConfig) -> Self {
        Self::new(config.clone())
    }
}
