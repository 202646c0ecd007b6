//! # Numeric Value Model
//!
//! A tagged numeric value over integers, exact rationals and floats.
//!
//! Every user-supplied number in the settings language becomes a [`Numb`].
//! The arithmetic operators promote between kinds: integer with rational
//! gives a rational (or an integer when it reduces), and anything combined
//! with a float gives a float. Dividing two integers that do not divide
//! evenly yields an exact rational, never a truncated integer.
//!
//! ## Invariant
//! A `Numb::Rat` never holds a denominator of 1; every constructor
//! normalizes such values back to `Numb::Int`. Downstream code may assume
//! `Rat` implies denominator > 1.
//!
//! ## Rational snapping
//! [`Numb::from_f64`] converts a float to the closest exact fraction with
//! denominator bounded by [`MAX_SNAP_DEN`]. This is the canonical
//! quantization step for floats destined to become exact durations or
//! pitches.

use num_rational::Ratio;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Rem, Sub};

/// Denominator bound for float-to-rational snapping.
///
/// 223092870 = 2*3*5*7*11*13*17*19*23, large enough that every duration a
/// notation program can represent survives the round trip.
pub const MAX_SNAP_DEN: i64 = 223_092_870;

/// Semitones per octave; pitch arithmetic is mod-12.
pub const SEMITONES: i64 = 12;

/// A numeric value: integer, exact rational, or float.
#[derive(Debug, Clone, Copy)]
pub enum Numb {
    Int(i64),
    Rat(Ratio<i64>),
    Float(f64),
}

impl Numb {
    /// Build a rational from numerator and denominator, reducing and
    /// normalizing a unit denominator back to `Int`.
    ///
    /// Returns `None` when `den` is zero; the caller attaches the source
    /// position and raises a division-by-zero error.
    pub fn rational(num: i64, den: i64) -> Option<Numb> {
        if den == 0 {
            return None;
        }
        Some(Self::from_ratio(Ratio::new(num, den)))
    }

    /// Normalize a reduced ratio into the canonical variant.
    pub fn from_ratio(r: Ratio<i64>) -> Numb {
        if r.is_integer() {
            Numb::Int(r.to_integer())
        } else {
            Numb::Rat(r)
        }
    }

    /// Snap a float to the best rational with denominator at most
    /// [`MAX_SNAP_DEN`]. Non-finite values stay floats.
    ///
    /// Branches on sign and splits off the integer part so numerator and
    /// denominator stay in range for large magnitudes.
    pub fn from_f64(x: f64) -> Numb {
        if !x.is_finite() {
            return Numb::Float(x);
        }
        if x < 0.0 {
            return -Numb::from_f64(-x);
        }
        if x >= (i64::MAX / 2) as f64 {
            return Numb::Float(x);
        }
        let whole = x.trunc() as i64;
        let frac = x - whole as f64;
        if frac < 1.0 / (2.0 * MAX_SNAP_DEN as f64) {
            return Numb::Int(whole);
        }
        let approx = approx_fraction(frac, MAX_SNAP_DEN);
        Numb::from_ratio(approx + Ratio::from_integer(whole))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Numb::Float(_))
    }

    /// Value as a float. Total for every variant.
    pub fn to_f64(&self) -> f64 {
        match self {
            Numb::Int(i) => *i as f64,
            Numb::Rat(r) => *r.numer() as f64 / *r.denom() as f64,
            Numb::Float(x) => *x,
        }
    }

    /// Value as a reduced ratio, snapping floats first.
    pub fn to_ratio(&self) -> Ratio<i64> {
        match self {
            Numb::Int(i) => Ratio::from_integer(*i),
            Numb::Rat(r) => *r,
            Numb::Float(x) => match Numb::from_f64(*x) {
                Numb::Int(i) => Ratio::from_integer(i),
                Numb::Rat(r) => r,
                // from_f64 only stays Float for non-finite or huge input
                Numb::Float(_) => Ratio::from_integer(0),
            },
        }
    }

    /// Exact integer value, or `None` for non-integral values.
    pub fn to_int(&self) -> Option<i64> {
        match self {
            Numb::Int(i) => Some(*i),
            Numb::Rat(_) => None,
            Numb::Float(x) => {
                if x.fract() == 0.0 && x.is_finite() {
                    Some(*x as i64)
                } else {
                    None
                }
            }
        }
    }

    /// Largest integer not greater than the value.
    pub fn floor(&self) -> i64 {
        match self {
            Numb::Int(i) => *i,
            Numb::Rat(r) => r.floor().to_integer(),
            Numb::Float(x) => x.floor() as i64,
        }
    }

    /// Nearest integer, halves rounding up.
    pub fn round(&self) -> i64 {
        match self {
            Numb::Int(i) => *i,
            Numb::Rat(r) => (r + Ratio::new(1, 2)).floor().to_integer(),
            Numb::Float(x) => (x + 0.5).floor() as i64,
        }
    }

    /// Floored remainder: `self - base * floor(self / base)`.
    /// The result has the sign of `base`.
    pub fn rem_floor(&self, base: &Numb) -> Numb {
        let q = (*self / *base).floor();
        *self - *base * Numb::Int(q)
    }

    /// Largest multiple of `base` not greater than the value.
    pub fn floor_to(&self, base: &Numb) -> Numb {
        *base * Numb::Int((*self / *base).floor())
    }

    /// Multiple of `base` nearest the value.
    pub fn round_to(&self, base: &Numb) -> Numb {
        *base * Numb::Int((*self / *base).round())
    }

    /// Chromatic pitch class in `[0, 12)`.
    pub fn pitch_class(&self) -> Numb {
        self.rem_floor(&Numb::Int(SEMITONES))
    }

    /// Octave number of a chromatic pitch (floor division by 12).
    pub fn octave_of(&self) -> i64 {
        (*self / Numb::Int(SEMITONES)).floor()
    }

    /// True when the value is plus-or-minus a power of two, or one over a
    /// power of two. This is the shape a rhythmic duration must reduce to.
    pub fn is_exp_of_2(&self) -> bool {
        match self {
            Numb::Int(i) => i.unsigned_abs().is_power_of_two(),
            // Rat invariant: denominator > 1, so only 1/2^k forms qualify
            Numb::Rat(r) => {
                r.numer().abs() == 1 && r.denom().unsigned_abs().is_power_of_two()
            }
            Numb::Float(x) => {
                let snapped = Numb::from_f64(*x);
                if snapped.is_float() {
                    false
                } else {
                    snapped.is_exp_of_2()
                }
            }
        }
    }
}

/// Prime factors of `n` with multiplicities, smallest prime first.
///
/// Used when choosing sensible tuplet subdivisions: a division count whose
/// lowest prime factors are small splits into conventional nested tuplets.
pub fn prime_multiplicities(mut n: u64) -> Vec<(u64, u32)> {
    let mut out = Vec::new();
    let mut p = 2u64;
    while p * p <= n {
        if n % p == 0 {
            let mut mult = 0;
            while n % p == 0 {
                n /= p;
                mult += 1;
            }
            out.push((p, mult));
        }
        p += if p == 2 { 1 } else { 2 };
    }
    if n > 1 {
        out.push((n, 1));
    }
    out
}

/// Best rational approximation of `x` in `[0, 1)` with denominator at most
/// `max_den`, by continued-fraction convergents with a final semiconvergent
/// correction.
fn approx_fraction(x: f64, max_den: i64) -> Ratio<i64> {
    debug_assert!((0.0..1.0).contains(&x));
    let (mut p0, mut q0, mut p1, mut q1) = (0i64, 1i64, 1i64, 0i64);
    let mut rem = x;
    loop {
        let a = rem.floor();
        if !a.is_finite() || a >= max_den as f64 {
            break;
        }
        let ai = a as i64;
        let (p2, q2) = match (
            ai.checked_mul(p1).and_then(|v| v.checked_add(p0)),
            ai.checked_mul(q1).and_then(|v| v.checked_add(q0)),
        ) {
            (Some(p2), Some(q2)) => (p2, q2),
            _ => break,
        };
        if q2 > max_den {
            // semiconvergent: step as far toward the next convergent as the
            // denominator bound allows, keep whichever is closer
            let k = (max_den - q0) / q1.max(1);
            if k > 0 {
                let ps = p0 + k * p1;
                let qs = q0 + k * q1;
                let err_semi = (ps as f64 / qs as f64 - x).abs();
                let err_conv = (p1 as f64 / q1.max(1) as f64 - x).abs();
                if err_semi < err_conv {
                    return Ratio::new(ps, qs);
                }
            }
            break;
        }
        p0 = p1;
        q0 = q1;
        p1 = p2;
        q1 = q2;
        let frac = rem - a;
        if frac < 1e-13 {
            break;
        }
        rem = 1.0 / frac;
    }
    if q1 == 0 {
        Ratio::from_integer(0)
    } else {
        Ratio::new(p1, q1)
    }
}

impl Add for Numb {
    type Output = Numb;
    fn add(self, rhs: Numb) -> Numb {
        match (self, rhs) {
            (Numb::Int(a), Numb::Int(b)) => Numb::Int(a + b),
            (Numb::Float(a), b) => Numb::Float(a + b.to_f64()),
            (a, Numb::Float(b)) => Numb::Float(a.to_f64() + b),
            (a, b) => Numb::from_ratio(a.to_ratio() + b.to_ratio()),
        }
    }
}

impl Sub for Numb {
    type Output = Numb;
    fn sub(self, rhs: Numb) -> Numb {
        self + (-rhs)
    }
}

impl Mul for Numb {
    type Output = Numb;
    fn mul(self, rhs: Numb) -> Numb {
        match (self, rhs) {
            (Numb::Int(a), Numb::Int(b)) => Numb::Int(a * b),
            (Numb::Float(a), b) => Numb::Float(a * b.to_f64()),
            (a, Numb::Float(b)) => Numb::Float(a.to_f64() * b),
            (a, b) => Numb::from_ratio(a.to_ratio() * b.to_ratio()),
        }
    }
}

impl Div for Numb {
    type Output = Numb;
    /// Integer division that does not divide evenly yields a rational.
    /// Division by an exact zero panics, like the primitive types; values
    /// from user input go through [`Numb::rational`] instead.
    fn div(self, rhs: Numb) -> Numb {
        match (self, rhs) {
            (Numb::Float(a), b) => Numb::Float(a / b.to_f64()),
            (a, Numb::Float(b)) => Numb::Float(a.to_f64() / b),
            (a, b) => Numb::from_ratio(a.to_ratio() / b.to_ratio()),
        }
    }
}

impl Rem for Numb {
    type Output = Numb;
    fn rem(self, rhs: Numb) -> Numb {
        self.rem_floor(&rhs)
    }
}

impl Neg for Numb {
    type Output = Numb;
    fn neg(self) -> Numb {
        match self {
            Numb::Int(i) => Numb::Int(-i),
            Numb::Rat(r) => Numb::Rat(-r),
            Numb::Float(x) => Numb::Float(-x),
        }
    }
}

impl PartialEq for Numb {
    fn eq(&self, other: &Numb) -> bool {
        match (self, other) {
            (Numb::Float(a), b) => *a == b.to_f64(),
            (a, Numb::Float(b)) => a.to_f64() == *b,
            (a, b) => a.to_ratio() == b.to_ratio(),
        }
    }
}

impl PartialOrd for Numb {
    fn partial_cmp(&self, other: &Numb) -> Option<Ordering> {
        match (self, other) {
            (Numb::Float(a), b) => a.partial_cmp(&b.to_f64()),
            (a, Numb::Float(b)) => a.to_f64().partial_cmp(b),
            (a, b) => a.to_ratio().partial_cmp(&b.to_ratio()),
        }
    }
}

impl fmt::Display for Numb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Numb::Int(i) => write!(f, "{}", i),
            Numb::Rat(r) => write!(f, "{}/{}", r.numer(), r.denom()),
            Numb::Float(x) => write!(f, "{}", x),
        }
    }
}

impl Serialize for Numb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Numb::Int(i) => serializer.serialize_i64(*i),
            Numb::Rat(r) => serializer.serialize_str(&format!("{}/{}", r.numer(), r.denom())),
            Numb::Float(x) => serializer.serialize_f64(*x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rational_reduces_to_int() {
        assert_eq!(Numb::rational(4, 2), Some(Numb::Int(2)));
        assert_eq!(Numb::rational(-6, 3), Some(Numb::Int(-2)));
        assert!(matches!(Numb::rational(5, 2), Some(Numb::Rat(_))));
    }

    #[test]
    fn test_rational_zero_denominator() {
        assert_eq!(Numb::rational(1, 0), None);
    }

    #[test]
    fn test_rational_lowest_terms() {
        let r = Numb::rational(6, 4).unwrap();
        match r {
            Numb::Rat(r) => {
                assert_eq!(*r.numer(), 3);
                assert_eq!(*r.denom(), 2);
            }
            other => panic!("expected rational, got {:?}", other),
        }
    }

    #[test]
    fn test_division_promotion() {
        assert_eq!(
            Numb::Int(5) / Numb::Int(2),
            Numb::rational(5, 2).unwrap()
        );
        assert_eq!(Numb::Int(4) / Numb::Int(2), Numb::Int(2));
    }

    #[test]
    fn test_mixed_arithmetic_promotes() {
        let sum = Numb::Int(1) + Numb::rational(1, 2).unwrap();
        assert_eq!(sum, Numb::rational(3, 2).unwrap());
        let product = Numb::rational(1, 2).unwrap() * Numb::Int(2);
        assert_eq!(product, Numb::Int(1));
        let with_float = Numb::Int(1) + Numb::Float(0.5);
        assert!(with_float.is_float());
        assert_eq!(with_float.to_f64(), 1.5);
    }

    #[test]
    fn test_float_snap_round_trip() {
        for &x in &[0.5, 0.25, 1.75, 0.3333333333333333, 2.2, -0.125, 7.0 / 11.0] {
            let snapped = Numb::from_f64(x);
            assert!(!snapped.is_float(), "{} stayed float", x);
            assert!((snapped.to_f64() - x).abs() < 1e-9, "{} round trip", x);
            if let Numb::Rat(r) = snapped {
                assert!(r.denom().abs() <= MAX_SNAP_DEN);
            }
        }
        assert_eq!(Numb::from_f64(3.0), Numb::Int(3));
        assert_eq!(Numb::from_f64(-2.0), Numb::Int(-2));
    }

    #[test]
    fn test_snap_negative_mirrors_positive() {
        assert_eq!(Numb::from_f64(-0.5), Numb::rational(-1, 2).unwrap());
        assert_eq!(Numb::from_f64(-1.25), Numb::rational(-5, 4).unwrap());
    }

    #[test]
    fn test_is_exp_of_2() {
        assert!(Numb::Int(1).is_exp_of_2());
        assert!(Numb::Int(2).is_exp_of_2());
        assert!(Numb::Int(4).is_exp_of_2());
        assert!(Numb::Int(8).is_exp_of_2());
        assert!(!Numb::Int(6).is_exp_of_2());
        assert!(!Numb::Int(3).is_exp_of_2());
        assert!(Numb::rational(1, 2).unwrap().is_exp_of_2());
        assert!(Numb::rational(1, 4).unwrap().is_exp_of_2());
        assert!(!Numb::rational(3, 4).unwrap().is_exp_of_2());
        assert!(Numb::Int(-4).is_exp_of_2());
    }

    #[test]
    fn test_pitch_class_and_octave() {
        assert_eq!(Numb::Int(60).pitch_class(), Numb::Int(0));
        assert_eq!(Numb::Int(61).pitch_class(), Numb::Int(1));
        assert_eq!(Numb::Int(-1).pitch_class(), Numb::Int(11));
        assert_eq!(Numb::Int(60).octave_of(), 5);
        assert_eq!(Numb::Int(-1).octave_of(), -1);
        let quarter_tone = Numb::rational(121, 2).unwrap(); // 60.5
        assert_eq!(
            quarter_tone.pitch_class(),
            Numb::rational(1, 2).unwrap()
        );
    }

    #[test]
    fn test_rem_floor_sign() {
        assert_eq!(
            Numb::Int(-7).rem_floor(&Numb::Int(12)),
            Numb::Int(5)
        );
        assert_eq!(Numb::Int(7).rem_floor(&Numb::Int(4)), Numb::Int(3));
    }

    #[test]
    fn test_round_to_base() {
        let half = Numb::rational(1, 2).unwrap();
        assert_eq!(Numb::Float(0.7).round_to(&half), half);
        assert_eq!(Numb::Float(0.8).round_to(&half), Numb::Int(1));
        assert_eq!(Numb::rational(5, 3).unwrap().floor_to(&half), half + half + half);
    }

    #[test]
    fn test_comparison_across_kinds() {
        assert!(Numb::rational(1, 2).unwrap() < Numb::Int(1));
        assert!(Numb::Float(0.5) == Numb::rational(1, 2).unwrap());
        assert!(Numb::Int(2) > Numb::rational(3, 2).unwrap());
    }

    #[test]
    fn test_prime_multiplicities() {
        assert_eq!(prime_multiplicities(12), vec![(2, 2), (3, 1)]);
        assert_eq!(prime_multiplicities(7), vec![(7, 1)]);
        assert_eq!(prime_multiplicities(1), vec![]);
        assert_eq!(prime_multiplicities(360), vec![(2, 3), (3, 2), (5, 1)]);
    }

    #[test]
    fn test_display() {
        assert_eq!(Numb::Int(5).to_string(), "5");
        assert_eq!(Numb::rational(5, 2).unwrap().to_string(), "5/2");
    }
}
