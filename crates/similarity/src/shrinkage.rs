/// Pull a similarity toward zero in proportion to how thin its support is
/// relative to the trust threshold `reg`:
///
/// `shrink(sim, support, reg) = support * sim / (support + reg)`
///
/// Returns 0 when the denominator is zero (no support and no regularization).
pub fn shrink(sim: f64, support: usize, reg: f64) -> f64 {
    let support = support as f64;
    let denominator = support + reg;
    if denominator == 0.0 {
        return 0.0;
    }
    support * sim / denominator
}
