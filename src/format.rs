//! Display formatting for amounts. Only used on the way out: the engine never
//! compares formatted strings.

/// Formats `amount` with two decimals, the currency symbol and Indian digit
/// grouping (`1,23,456.70`).
///
/// Unknown currency codes are printed in front of the number.
pub fn format_currency(amount: f64, currency_code: &str) -> String {
    let prefix = match currency_code.to_ascii_uppercase().as_str() {
        "INR" => "₹".to_string(),
        "USD" => "$".to_string(),
        "EUR" => "€".to_string(),
        "GBP" => "£".to_string(),
        "JPY" => "¥".to_string(),
        other => format!("{other} "),
    };
    let fixed = format!("{:.2}", amount.abs());
    let (integer, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let negative = amount < 0.0 && fixed.bytes().any(|b| b.is_ascii_digit() && b != b'0');
    format!(
        "{}{prefix}{}.{fraction}",
        if negative { "-" } else { "" },
        group_digits(integer)
    )
}

fn group_digits(digits: &str) -> String {
    if digits.len() <= 3 {
        return digits.to_string();
    }
    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut groups: Vec<&str> = Vec::new();
    let mut rest = head;
    while rest.len() > 2 {
        let (left, right) = rest.split_at(rest.len() - 2);
        groups.push(right);
        rest = left;
    }
    groups.push(rest);
    groups.reverse();
    format!("{},{tail}", groups.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_known_currencies() {
        assert_eq!(format_currency(40.0, "INR"), "₹40.00");
        assert_eq!(format_currency(1234.5, "usd"), "$1,234.50");
        assert_eq!(format_currency(0.126, "EUR"), "€0.13");
    }

    #[test]
    fn indian_grouping() {
        assert_eq!(format_currency(123456.7, "INR"), "₹1,23,456.70");
        assert_eq!(format_currency(12345678.0, "INR"), "₹1,23,45,678.00");
        assert_eq!(format_currency(999.999, "INR"), "₹1,000.00");
    }

    #[test]
    fn negative_amounts() {
        assert_eq!(format_currency(-40.0, "INR"), "-₹40.00");
        assert_eq!(format_currency(-0.001, "INR"), "₹0.00");
    }

    #[test]
    fn unknown_currency_uses_code() {
        assert_eq!(format_currency(5.0, "CHF"), "CHF 5.00");
    }
}
