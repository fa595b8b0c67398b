//! Deterministic team colors.

const PALETTE: [&str; 10] = [
    "#4f46e5", "#0ea5e9", "#10b981", "#f59e0b", "#ef4444", "#8b5cf6", "#ec4899", "#14b8a6",
    "#f97316", "#64748b",
];

/// Color assigned to a team name. The same name always maps to the same
/// color, across sessions and restarts.
pub fn team_color(team: &str) -> &'static str {
    let index = (name_hash(team) % PALETTE.len() as u32) as usize;
    PALETTE[index]
}

// djb2 over bytes
fn name_hash(name: &str) -> u32 {
    name.bytes().fold(5381u32, |hash, byte| {
        hash.wrapping_mul(33).wrapping_add(u32::from(byte))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_are_stable() {
        assert_eq!(team_color("Northwind"), team_color("Northwind"));
        assert!(PALETTE.contains(&team_color("")));
    }

    #[test]
    fn hash_matches_reference_values() {
        assert_eq!(name_hash(""), 5381);
        assert_eq!(name_hash("a"), 5381 * 33 + 97);
    }

    #[test]
    fn names_spread_over_palette() {
        let names = ["Alpha", "Beta", "Gamma", "Delta", "Epsilon", "Zeta"];
        let distinct: std::collections::HashSet<&str> =
            names.iter().map(|name| team_color(name)).collect();
        assert!(distinct.len() > 1);
    }
}
