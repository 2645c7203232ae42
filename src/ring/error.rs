/*
 *  ring/error.rs
 *
 *  PriceRing - see the price coming
 *  (c) 2020-26 Stuart Hunter
 *
 *  Error type for ring render targets
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::error::Error;
use std::fmt;

/// Unified error type for all ring operations
#[derive(Debug)]
pub enum RingError {
    /// start/stop/update called before create()
    NotCreated,

    /// Animation options the target cannot honour
    InvalidOptions(String),

    /// Frame list must hold at least one frame
    NoFrames,

    /// Generic error with message
    Other(String),
}

impl fmt::Display for RingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingError::NotCreated =>
                write!(f, "Ring animation has not been created"),
            RingError::InvalidOptions(msg) =>
                write!(f, "Invalid animation options: {}", msg),
            RingError::NoFrames =>
                write!(f, "Animation needs at least one frame"),
            RingError::Other(msg) =>
                write!(f, "{}", msg),
        }
    }
}

impl Error for RingError {}
