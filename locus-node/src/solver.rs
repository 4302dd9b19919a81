//! Trilateration solver — intersects the perpendicular bisectors of two
//! adjacent sample chords to recover the observer's position.
//!
//! Three time-separated observations of the moving beacon lie on a circle
//! centered on the stationary observer. The perpendicular bisector of any
//! chord passes through the center, so two bisectors pin it down. The
//! minimum-chord gate applied at sample-acceptance time keeps the bisectors
//! well-conditioned in the common case, but near-parallel bisectors are
//! still detected here and reported as [`SolveError::Degenerate`] rather
//! than assumed away.

use locus_types::Position;
use serde::Deserialize;
use thiserror::Error;

/// Bisector pairs whose determinant falls below this are treated as
/// parallel.
const DEGENERACY_EPS: f32 = 1e-6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SolveError {
    /// The two bisectors are (numerically) parallel: collinear or
    /// coincident samples. No unique position exists.
    #[error("perpendicular bisectors are numerically parallel")]
    Degenerate,
}

/// How the solved coordinates are signed.
///
/// `ForcePositive` reproduces the deployed devices, which take the
/// absolute value of both coordinates unconditionally and so folds every
/// estimate into the positive quadrant. That is almost certainly a latent
/// defect rather than intent; `Signed` keeps the solved quadrant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignMode {
    #[default]
    ForcePositive,
    Signed,
}

/// Perpendicular bisector of a sample chord, as the coefficients of
/// `{(x, y) : a·x + b·y = c}`.
#[derive(Debug, Clone, Copy)]
pub struct ChordLine {
    pub a: f32,
    pub b: f32,
    pub c: f32,
}

impl ChordLine {
    /// The bisector of segment `pq`: through the midpoint, normal to the
    /// segment direction.
    pub fn bisecting(p: &Position, q: &Position) -> Self {
        let a = q.x - p.x;
        let b = q.y - p.y;
        let c = a * ((p.x + q.x) / 2.0) + b * ((p.y + q.y) / 2.0);
        Self { a, b, c }
    }
}

/// Solve the 2×2 system of the two adjacent-chord bisectors via Cramer's
/// rule.
pub fn solve(samples: &[Position; 3], mode: SignMode) -> Result<Position, SolveError> {
    let l01 = ChordLine::bisecting(&samples[0], &samples[1]);
    let l12 = ChordLine::bisecting(&samples[1], &samples[2]);

    let det = l01.a * l12.b - l12.a * l01.b;
    if det.abs() < DEGENERACY_EPS {
        return Err(SolveError::Degenerate);
    }

    let x = (l01.c * l12.b - l12.c * l01.b) / det;
    let y = (l01.a * l12.c - l12.a * l01.c) / det;

    Ok(match mode {
        SignMode::ForcePositive => Position::new(x.abs(), y.abs()),
        SignMode::Signed => Position::new(x, y),
    })
}
