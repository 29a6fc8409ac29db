//! Brazilian real (BRL) amounts as integer cents.
//!
//! Values arrive formatted the pt-BR way (`R$ 1.234,56`): `.` groups
//! thousands and `,` separates the two decimal places. Arithmetic is done on
//! `i64` cents so formulas never accumulate floating-point error.

/// Parse `R$ 1.234,56`, `1.234,56`, `1234,5` or `1.234` into cents.
///
/// A leading `-` (before or after the symbol) is accepted. Whitespace,
/// including the no-break space some formatters put after `R$`, is ignored.
/// Returns `None` for anything else.
pub fn parse_brl(input: &str) -> Option<i64> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let (negative, rest) = match compact.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, compact.as_str()),
    };
    let rest = rest.strip_prefix("R$").unwrap_or(rest);
    let (negative, rest) = match rest.strip_prefix('-') {
        Some(r) if !negative => (true, r),
        Some(_) => return None,
        None => (negative, rest),
    };

    let (int_part, frac_part) = match rest.split_once(',') {
        Some((i, f)) => (i, Some(f)),
        None => (rest, None),
    };
    if int_part.is_empty() || !valid_grouping(int_part) {
        return None;
    }

    let mut cents: i64 = 0;
    for c in int_part.chars().filter(|c| *c != '.') {
        cents = cents.checked_mul(10)?.checked_add(c.to_digit(10)? as i64)?;
    }
    cents = cents.checked_mul(100)?;

    if let Some(frac) = frac_part {
        if frac.is_empty() || frac.len() > 2 || !frac.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let mut f: i64 = frac.parse().ok()?;
        if frac.len() == 1 {
            f *= 10;
        }
        cents = cents.checked_add(f)?;
    }

    Some(if negative { -cents } else { cents })
}

/// Either plain digits or properly grouped `1.234.567`.
fn valid_grouping(int_part: &str) -> bool {
    if !int_part.contains('.') {
        return int_part.chars().all(|c| c.is_ascii_digit());
    }
    let mut groups = int_part.split('.');
    let head_ok = groups
        .next()
        .map(|g| (1..=3).contains(&g.len()) && g.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false);
    head_ok && groups.all(|g| g.len() == 3 && g.chars().all(|c| c.is_ascii_digit()))
}

/// Format cents as `R$ 1.234,56`.
pub fn format_brl(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    format!("{sign}R$ {}", format_unsigned(cents.unsigned_abs()))
}

/// Format cents as `1.234,56` (no currency symbol).
pub fn format_brl_raw(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    format!("{sign}{}", format_unsigned(cents.unsigned_abs()))
}

fn format_unsigned(cents: u64) -> String {
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    format!("{grouped},{:02}", cents % 100)
}

/// `percent`% of `cents`, rounded half away from zero.
pub fn percent_of(cents: i64, percent: u32) -> Option<i64> {
    let scaled = (cents as i128) * (percent as i128);
    let rounded = if scaled >= 0 {
        (scaled + 50) / 100
    } else {
        (scaled - 50) / 100
    };
    i64::try_from(rounded).ok()
}
