pub fn get_random_f64() -> f64 {
    let mut buf = [0u8; 8];
    if getrandom::fill(&mut buf).is_err() {
        return 0.5;
    }
    let random_u64 = u64::from_le_bytes(buf);
    // Scale to [0, 1) with proper precision
    (random_u64 >> 11) as f64 * (1.0 / ((1u64 << 53) as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_f64_is_in_unit_interval() {
        for _ in 0..1000 {
            let v = get_random_f64();
            assert!((0.0..1.0).contains(&v));
        }
    }
}
