//! Affine mapping between controller and logical coordinates.

/// `logical = scale * raw + offset`.
///
/// A transform chain (negation, linear maps) flattens into one `Affine`
/// so the planner only ever sees logical coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    /// Multiplier applied to the raw coordinate.
    pub scale: f64,
    /// Offset added after scaling.
    pub offset: f64,
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine {
    /// The identity mapping.
    pub const IDENTITY: Self = Self {
        scale: 1.0,
        offset: 0.0,
    };

    /// Create a mapping.
    pub const fn new(scale: f64, offset: f64) -> Self {
        Self { scale, offset }
    }

    /// Apply `outer` after `self`.
    pub fn then(self, outer: Affine) -> Self {
        Self {
            scale: outer.scale * self.scale,
            offset: outer.scale * self.offset + outer.offset,
        }
    }

    /// Controller coordinate to logical coordinate.
    #[inline]
    pub fn to_logical(&self, raw: f64) -> f64 {
        self.scale * raw + self.offset
    }

    /// Logical coordinate to controller coordinate.
    #[inline]
    pub fn to_raw(&self, logical: f64) -> f64 {
        (logical - self.offset) / self.scale
    }

    /// Magnitude of the scale, used to convert rates.
    #[inline]
    pub fn gain(&self) -> f64 {
        self.scale.abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_negation_is_identity() {
        let negate = Affine::new(-1.0, 0.0);
        let chain = Affine::IDENTITY.then(negate).then(negate);
        assert_eq!(chain, Affine::IDENTITY);
    }

    #[test]
    fn test_chain_round_trip() {
        let chain = Affine::IDENTITY
            .then(Affine::new(2.0, 1.0))
            .then(Affine::new(-1.0, 0.5));
        // logical = -(2 * raw + 1) + 0.5
        assert!((chain.to_logical(3.0) - (-6.5)).abs() < 1e-12);
        assert!((chain.to_raw(chain.to_logical(3.0)) - 3.0).abs() < 1e-12);
    }
}
