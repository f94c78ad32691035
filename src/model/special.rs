// Digamma and trigamma, enough precision for variational LDA updates.

/// psi(x) = d/dx ln Gamma(x), for x > 0.
pub fn digamma(mut x: f64) -> f64 {
    let mut result = 0.0;
    while x < 6.0 {
        result -= 1.0 / x;
        x += 1.0;
    }
    let inv = 1.0 / x;
    let inv2 = inv * inv;
    result + x.ln() - 0.5 * inv
        - inv2
            * (1.0 / 12.0
                - inv2 * (1.0 / 120.0 - inv2 * (1.0 / 252.0 - inv2 * (1.0 / 240.0 - inv2 / 132.0))))
}

/// psi'(x), for x > 0.
pub fn trigamma(mut x: f64) -> f64 {
    let mut result = 0.0;
    while x < 6.0 {
        result += 1.0 / (x * x);
        x += 1.0;
    }
    let inv = 1.0 / x;
    let inv2 = inv * inv;
    result
        + inv
        + 0.5 * inv2
        + inv * inv2 * (1.0 / 6.0 - inv2 * (1.0 / 30.0 - inv2 * (1.0 / 42.0 - inv2 / 30.0)))
}

/// E[log theta] for theta ~ Dirichlet(params).
pub fn dirichlet_expectation(params: &[f64]) -> Vec<f64> {
    let total = digamma(params.iter().sum());
    params.iter().map(|&p| digamma(p) - total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digamma_known_values() {
        // psi(1) = -Euler–Mascheroni
        assert!((digamma(1.0) + 0.577_215_664_901_532_9).abs() < 1e-10);
        // psi(0.5) = -gamma - 2 ln 2
        assert!((digamma(0.5) + 1.963_510_026_021_423_5).abs() < 1e-10);
        // psi(x + 1) = psi(x) + 1/x
        assert!((digamma(3.7) - digamma(2.7) - 1.0 / 2.7).abs() < 1e-12);
    }

    #[test]
    fn trigamma_known_values() {
        // psi'(1) = pi^2 / 6
        let expected = std::f64::consts::PI.powi(2) / 6.0;
        assert!((trigamma(1.0) - expected).abs() < 1e-9);
        assert!((trigamma(0.5) - std::f64::consts::PI.powi(2) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn dirichlet_expectation_is_negative() {
        let e = dirichlet_expectation(&[1.0, 2.0, 3.0]);
        assert!(e.iter().all(|&v| v < 0.0));
        // Larger concentration means larger expected log-probability
        assert!(e[0] < e[1] && e[1] < e[2]);
    }
}
