// Compile-time assertion on constant expressions
#[macro_export]
macro_rules! static_assert {
    ($cond:expr, $msg:expr) => {
        const _: () = assert!($cond, $msg);
    };
}

// Format an atomic amount using the coin decimals
pub fn format_coin(value: u64) -> String {
    use crate::config::{COIN_DECIMALS, COIN_VALUE};
    format!(
        "{}.{:0width$}",
        value / COIN_VALUE,
        value % COIN_VALUE,
        width = COIN_DECIMALS as usize
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::COIN_VALUE;

    #[test]
    fn test_format_coin() {
        assert_eq!(format_coin(COIN_VALUE), "1.00000000");
        assert_eq!(format_coin(COIN_VALUE * 12 + 5), "12.00000005");
        assert_eq!(format_coin(0), "0.00000000");
    }
}
