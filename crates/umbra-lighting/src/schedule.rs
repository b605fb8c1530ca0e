//! Time-sliced refresh scheduling for cube faces and cascade slices.
//!
//! A [`RefreshSchedule`] owns a fractional phase in `[0, face_count)`. Each
//! call advances the phase; whenever it crosses one or more integer slots the
//! crossed faces come back dirty as a [`FaceMask`]. Faces are visited in a
//! fixed round-robin order, so every face is redrawn once per full sweep.

/// Number of faces in a cube map.
pub const CUBE_FACE_COUNT: usize = 6;

/// Largest face count a [`FaceMask`] can address.
pub const MAX_FACES: usize = 32;

/// Set of dirty face (or cascade slice) indices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FaceMask(u32);

impl FaceMask {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every face in `0..face_count`.
    pub fn all(face_count: usize) -> Self {
        debug_assert!(face_count <= MAX_FACES);
        if face_count >= MAX_FACES {
            Self(u32::MAX)
        } else {
            Self((1u32 << face_count) - 1)
        }
    }

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn with(self, face: usize) -> Self {
        debug_assert!(face < MAX_FACES);
        Self(self.0 | (1 << face))
    }

    pub fn contains(self, face: usize) -> bool {
        face < MAX_FACES && self.0 & (1 << face) != 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Dirty indices in ascending order.
    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..MAX_FACES).filter(move |&i| self.0 & (1 << i) != 0)
    }
}

impl std::ops::BitOr for FaceMask {
    type Output = FaceMask;

    fn bitor(self, rhs: FaceMask) -> FaceMask {
        FaceMask(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for FaceMask {
    fn bitor_assign(&mut self, rhs: FaceMask) {
        self.0 |= rhs.0;
    }
}

/// Circular half-open range `[lower, upper)` over `face_count` faces.
///
/// Wraps past the last face when `lower > upper`. `lower == upper` means a
/// whole cycle elapsed and marks every face.
pub fn dirty_range(lower: usize, upper: usize, face_count: usize) -> FaceMask {
    debug_assert!(lower < face_count && upper < face_count);
    if lower == upper {
        return FaceMask::all(face_count);
    }
    let mut mask = FaceMask::empty();
    let mut face = lower;
    while face != upper {
        mask = mask.with(face);
        face = (face + 1) % face_count;
    }
    mask
}

/// Round-robin phase accumulator for one refreshable face set.
#[derive(Clone, Debug, PartialEq)]
pub struct RefreshSchedule {
    face_count: usize,
    phase: f32,
}

impl RefreshSchedule {
    pub fn new(face_count: usize) -> Self {
        assert!(
            (1..=MAX_FACES).contains(&face_count),
            "face count {face_count} outside 1..={MAX_FACES}"
        );
        Self {
            face_count,
            phase: 0.0,
        }
    }

    /// Schedule over the six faces of a cube map.
    pub fn cube() -> Self {
        Self::new(CUBE_FACE_COUNT)
    }

    pub fn face_count(&self) -> usize {
        self.face_count
    }

    /// Current phase, always in `[0, face_count)`.
    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    /// Advance by `dt` seconds at `frequency` full sweeps per second.
    ///
    /// Returns `None` when no face slot boundary was crossed.
    pub fn advance(&mut self, frequency: f32, dt: f32) -> Option<FaceMask> {
        self.advance_by(self.face_count as f32 * frequency * dt)
    }

    /// Advance the phase by `step` face slots.
    pub fn advance_by(&mut self, step: f32) -> Option<FaceMask> {
        if !(step.is_finite() && step > 0.0) {
            return None;
        }
        let count = self.face_count as f32;
        let lower = self.phase.floor();
        let advanced = self.phase + step;
        let reached = advanced.floor();
        self.phase = advanced % count;
        // Guard against `x % n` rounding up to `n` for values just below it.
        if self.phase >= count {
            self.phase = 0.0;
        }

        if reached <= lower {
            return None;
        }
        if reached - lower >= count {
            return Some(FaceMask::all(self.face_count));
        }
        let lower = lower as usize % self.face_count;
        let upper = reached as usize % self.face_count;
        Some(dirty_range(lower, upper, self.face_count))
    }
}
