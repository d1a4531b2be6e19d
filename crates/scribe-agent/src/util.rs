use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_millis_is_monotonic_enough() {
        let before = epoch_millis();
        let after = epoch_millis();
        assert!(after >= before);
    }
}
