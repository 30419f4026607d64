use nalgebra::Vector2;

// ---------------------------------------------------------------------------
// RK4 step with actuation held constant over the step
// ---------------------------------------------------------------------------

/// Single RK4 step of `x' = f(x, u)` with `u` held for the whole step.
pub fn rk4_step<F>(x: &Vector2<f64>, u: f64, dt: f64, f: F) -> Vector2<f64>
where
    F: Fn(&Vector2<f64>, f64) -> Vector2<f64>,
{
    let k1 = f(x, u);
    let k2 = f(&(x + k1 * (dt * 0.5)), u);
    let k3 = f(&(x + k2 * (dt * 0.5)), u);
    let k4 = f(&(x + k3 * dt), u);
    x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_decay_matches_closed_form() {
        // x' = -x, x(0) = 1 -> x(1) = e^-1
        let mut x = Vector2::new(1.0, 1.0);
        for _ in 0..100 {
            x = rk4_step(&x, 0.0, 0.01, |x, _| -x);
        }
        let expected = (-1.0_f64).exp();
        assert!((x.x - expected).abs() < 1e-9);
    }
}
