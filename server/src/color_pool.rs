//! Allocation of the 16 player colors
//!
//! A color is either free or held by exactly one connection. Claiming a new
//! color releases the caller's previous one in the same call, so there is no
//! window where a participant holds two colors or none.

use log::debug;
use race_shared::{ColorId, ConnectionId, RequestError, COLOR_COUNT};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Palette names, indexed by [`ColorId`].
pub const COLOR_NAMES: [&str; COLOR_COUNT] = [
    "red", "blue", "green", "yellow", "orange", "purple", "cyan", "magenta", "white", "black",
    "grey", "pink", "brown", "lime", "navy", "teal",
];

pub struct ColorPool {
    holders: [Option<ConnectionId>; COLOR_COUNT],
    rng: StdRng,
}

impl ColorPool {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            holders: [None; COLOR_COUNT],
            rng,
        }
    }

    /// Gives `holder` a pseudo-random free color, or `None` if all are taken.
    pub fn assign_random(&mut self, holder: ConnectionId) -> Option<ColorId> {
        let free: Vec<ColorId> = (0..COLOR_COUNT as ColorId)
            .filter(|&color| self.holders[color as usize].is_none())
            .collect();

        let color = *free.choose(&mut self.rng)?;
        self.release_holder(holder);
        self.holders[color as usize] = Some(holder);
        debug!("Assigned color {} to connection {}", COLOR_NAMES[color as usize], holder);
        Some(color)
    }

    /// Moves `holder` onto `desired` if it is free.
    pub fn claim(&mut self, holder: ConnectionId, desired: i32) -> Result<ColorId, RequestError> {
        let color = ColorId::try_from(desired)
            .ok()
            .filter(|&c| (c as usize) < COLOR_COUNT)
            .ok_or_else(|| RequestError::invalid(format!("color {} is out of range", desired)))?;

        if let Some(current) = self.holders[color as usize] {
            return Err(RequestError::exhausted(format!(
                "color {} is held by connection {}",
                COLOR_NAMES[color as usize], current
            )));
        }

        self.release_holder(holder);
        self.holders[color as usize] = Some(holder);
        Ok(color)
    }

    /// Frees whatever color `holder` has.
    pub fn release_holder(&mut self, holder: ConnectionId) -> Option<ColorId> {
        let index = self.holders.iter().position(|h| *h == Some(holder))?;
        self.holders[index] = None;
        Some(index as ColorId)
    }

    pub fn holder(&self, color: ColorId) -> Option<ConnectionId> {
        self.holders.get(color as usize).copied().flatten()
    }

    pub fn color_of(&self, holder: ConnectionId) -> Option<ColorId> {
        self.holders
            .iter()
            .position(|h| *h == Some(holder))
            .map(|index| index as ColorId)
    }

    pub fn free_count(&self) -> usize {
        self.holders.iter().filter(|h| h.is_none()).count()
    }
}
