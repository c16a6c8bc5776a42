//! The Polynomial Evaluator (spec §4.1): Shomate-style `Cp`/`H`/`S`/`G`
//! and their closed-form definite integrals.

use crate::catalog::CatalogLike;
use crate::errors::{ThermoError, ThermoResult};

/// Standard reference temperature, 298.15 K.
pub const T_REF: f64 = 298.15;

fn reduced_t(t: f64) -> f64 {
    t / 1000.0
}

fn check_temperature(t: f64) -> ThermoResult<()> {
    if t <= 0.0 {
        return Err(ThermoError::InvalidTemperature(t));
    }
    Ok(())
}

/// `Cp(T) = f1 + f2·t + f3·t² + f4·t³ + f5/t²`, `t = T/1000`.
pub fn heat_capacity(row: &dyn CatalogLike, t: f64) -> ThermoResult<f64> {
    check_temperature(t)?;
    let [f1, f2, f3, f4, f5, _f6] = row.coeffs();
    let x = reduced_t(t);
    let cp = f1 + f2 * x + f3 * x * x + f4 * x * x * x + f5 / (x * x);
    if !cp.is_finite() {
        return Err(ThermoError::EvaluationError {
            component: "heat_capacity".into(),
            detail: format!("non-finite Cp at T={t}"),
        });
    }
    Ok(cp)
}

/// Indefinite-integral antiderivative of `Cp` in `t`-space, used by both
/// `H` and its boundary evaluation: `f1·t + f2·t²/2 + f3·t³/3 + f4·t⁴/4 −
/// f5/t`.
fn enthalpy_antiderivative(coeffs: &[f64; 6], x: f64) -> f64 {
    let [f1, f2, f3, f4, f5, _f6] = *coeffs;
    f1 * x + f2 * x * x / 2.0 + f3 * x.powi(3) / 3.0 + f4 * x.powi(4) / 4.0 - f5 / x
}

/// Indefinite-integral antiderivative of `Cp/τ` in `t`-space: `f1·ln(t) +
/// f2·t + f3·t²/2 + f4·t³/3 − f5/(2t²)`.
fn entropy_antiderivative(coeffs: &[f64; 6], x: f64) -> f64 {
    let [f1, f2, f3, f4, f5, _f6] = *coeffs;
    f1 * x.ln() + f2 * x + f3 * x * x / 2.0 + f4 * x.powi(3) / 3.0 - f5 / (2.0 * x * x)
}

/// `H(T) = h298 + ∫_{298.15}^{T} Cp(τ) dτ`, closed form, J/mol.
pub fn enthalpy(row: &dyn CatalogLike, t: f64) -> ThermoResult<f64> {
    check_temperature(t)?;
    let coeffs = row.coeffs();
    let x = reduced_t(t);
    let x0 = reduced_t(T_REF);
    let h = row.h298() + 1000.0 * (enthalpy_antiderivative(&coeffs, x) - enthalpy_antiderivative(&coeffs, x0));
    if !h.is_finite() {
        return Err(ThermoError::EvaluationError {
            component: "enthalpy".into(),
            detail: format!("non-finite H at T={t}"),
        });
    }
    Ok(h)
}

/// `S(T) = s298 + ∫_{298.15}^{T} Cp(τ)/τ dτ`, closed form, J/(mol·K).
pub fn entropy(row: &dyn CatalogLike, t: f64) -> ThermoResult<f64> {
    check_temperature(t)?;
    let coeffs = row.coeffs();
    let x = reduced_t(t);
    let x0 = reduced_t(T_REF);
    let s = row.s298() + entropy_antiderivative(&coeffs, x) - entropy_antiderivative(&coeffs, x0);
    if !s.is_finite() {
        return Err(ThermoError::EvaluationError {
            component: "entropy".into(),
            detail: format!("non-finite S at T={t}"),
        });
    }
    Ok(s)
}

/// `G(T) = H(T) − T·S(T)`, J/mol.
pub fn gibbs_energy(row: &dyn CatalogLike, t: f64) -> ThermoResult<f64> {
    let h = enthalpy(row, t)?;
    let s = entropy(row, t)?;
    Ok(h - t * s)
}

/// A complete set of thermodynamic properties at one temperature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermoPoint {
    pub t: f64,
    pub cp: f64,
    pub h: f64,
    pub s: f64,
    pub g: f64,
}

/// Evaluates `Cp`, `H`, `S`, `G` together at `t` for a single row.
pub fn evaluate(row: &dyn CatalogLike, t: f64) -> ThermoResult<ThermoPoint> {
    let cp = heat_capacity(row, t)?;
    let h = enthalpy(row, t)?;
    let s = entropy(row, t)?;
    Ok(ThermoPoint {
        t,
        cp,
        h,
        s,
        g: h - t * s,
    })
}

/// Definite integral of `Cp` over `[t_lo, t_hi]`: `H(t_hi) − H(t_lo)`
/// without the `h298` offset, i.e. a pure sub-interval contribution.
pub fn integrate_enthalpy(row: &dyn CatalogLike, t_lo: f64, t_hi: f64) -> ThermoResult<f64> {
    check_temperature(t_lo)?;
    check_temperature(t_hi)?;
    let coeffs = row.coeffs();
    let x_lo = reduced_t(t_lo);
    let x_hi = reduced_t(t_hi);
    Ok(1000.0 * (enthalpy_antiderivative(&coeffs, x_hi) - enthalpy_antiderivative(&coeffs, x_lo)))
}

/// Definite integral of `Cp/τ` over `[t_lo, t_hi]`.
pub fn integrate_entropy(row: &dyn CatalogLike, t_lo: f64, t_hi: f64) -> ThermoResult<f64> {
    check_temperature(t_lo)?;
    check_temperature(t_hi)?;
    let coeffs = row.coeffs();
    let x_lo = reduced_t(t_lo);
    let x_hi = reduced_t(t_hi);
    Ok(entropy_antiderivative(&coeffs, x_hi) - entropy_antiderivative(&coeffs, x_lo))
}

/// A lazy, restartable sequence of scalar evaluations over a sorted
/// temperature list for one row (spec §4.1: "a lazy, restartable sequence
/// of scalar results"). Restartable simply means the iterator can be
/// reconstructed from the same `row`/`temperatures` at no cost — there is
/// no hidden mutable state beyond the cursor into `temperatures`.
pub struct RowTrajectory<'a> {
    row: &'a dyn CatalogLike,
    temperatures: std::slice::Iter<'a, f64>,
}

impl<'a> RowTrajectory<'a> {
    pub fn new(row: &'a dyn CatalogLike, temperatures: &'a [f64]) -> Self {
        Self {
            row,
            temperatures: temperatures.iter(),
        }
    }
}

impl<'a> Iterator for RowTrajectory<'a> {
    type Item = ThermoResult<ThermoPoint>;

    fn next(&mut self) -> Option<Self::Item> {
        self.temperatures.next().map(|&t| evaluate(self.row, t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogRow;
    use crate::phase::Phase;
    use approx::assert_relative_eq;

    fn water_liquid() -> CatalogRow {
        // NIST-style Shomate coefficients for liquid water, 298-500 K.
        CatalogRow::new(
            1,
            "H2O(l)",
            Some("water".into()),
            Some(Phase::Liquid),
            298.0,
            500.0,
            -285_830.0,
            69.95,
            [-203.606, 1523.29, -3196.413, 2474.455, 3.855326, -256.5478],
            Some(273.15),
            Some(373.15),
            1,
        )
        .unwrap()
    }

    #[test]
    fn rejects_nonpositive_temperature() {
        let row = water_liquid();
        assert!(matches!(
            heat_capacity(&row, 0.0),
            Err(ThermoError::InvalidTemperature(_))
        ));
        assert!(matches!(
            heat_capacity(&row, -10.0),
            Err(ThermoError::InvalidTemperature(_))
        ));
    }

    #[test]
    fn enthalpy_at_reference_temperature_equals_h298() {
        let row = water_liquid();
        let h = enthalpy(&row, T_REF).unwrap();
        assert_relative_eq!(h, row.h298, max_relative = 1e-9);
    }

    #[test]
    fn entropy_at_reference_temperature_equals_s298() {
        let row = water_liquid();
        let s = entropy(&row, T_REF).unwrap();
        assert_relative_eq!(s, row.s298, max_relative = 1e-9);
    }

    #[test]
    fn enthalpy_matches_manual_numeric_integration() {
        let row = water_liquid();
        let t = 300.0;
        let h_closed = enthalpy(&row, t).unwrap();

        // Fine-grained manual Riemann sum as an independent cross-check.
        let steps = 200_000;
        let dt = (t - T_REF) / steps as f64;
        let mut acc = 0.0;
        for i in 0..steps {
            let tau = T_REF + (i as f64 + 0.5) * dt;
            acc += heat_capacity(&row, tau).unwrap() * dt;
        }
        let h_numeric = row.h298 + acc;
        assert_relative_eq!(h_closed, h_numeric, max_relative = 1e-6);
    }

    #[test]
    fn gibbs_is_h_minus_t_s() {
        let row = water_liquid();
        let t = 320.0;
        let h = enthalpy(&row, t).unwrap();
        let s = entropy(&row, t).unwrap();
        let g = gibbs_energy(&row, t).unwrap();
        assert_relative_eq!(g, h - t * s, max_relative = 1e-12);
    }

    #[test]
    fn trajectory_is_restartable() {
        let row = water_liquid();
        let temps = [300.0, 350.0, 400.0];
        let first: Vec<_> = RowTrajectory::new(&row, &temps)
            .map(|r| r.unwrap().h)
            .collect();
        let second: Vec<_> = RowTrajectory::new(&row, &temps)
            .map(|r| r.unwrap().h)
            .collect();
        assert_eq!(first, second);
    }
}
