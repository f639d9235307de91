//! Company name normalization and duplicate removal.

use std::collections::HashSet;

use leadscout_shared::{Company, DecisionMaker};
use tracing::debug;

/// Trailing legal-form tokens stripped from company names.
const LEGAL_SUFFIXES: &[&str] = &[
    "inc",
    "incorporated",
    "llc",
    "ltd",
    "limited",
    "corp",
    "corporation",
    "co",
    "plc",
    "gmbh",
    "ag",
    "sa",
    "bv",
    "nv",
    "lp",
    "llp",
];

/// Normalize a company name into its dedupe key.
///
/// Lowercases, treats `,` and `.` as separators, collapses whitespace and
/// strips trailing legal suffixes repeatedly. A name made only of a suffix
/// keeps its last token. Idempotent.
pub fn normalize(name: &str) -> String {
    let lowered = name.to_lowercase().replace([',', '.'], " ");
    let mut tokens: Vec<&str> = lowered.split_whitespace().collect();
    while tokens.len() > 1 && tokens.last().is_some_and(|t| LEGAL_SUFFIXES.contains(t)) {
        tokens.pop();
    }
    tokens.join(" ")
}

/// Remove duplicate companies by normalized key.
///
/// The first occurrence of a key wins and input order is preserved. Companies
/// whose key is empty are dropped. Each survivor gets its `key` set, its
/// decision makers re-pointed at that key and deduplicated by name.
pub fn dedupe(companies: Vec<Company>) -> Vec<Company> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(companies.len());

    for mut company in companies {
        let key = normalize(&company.name);
        if key.is_empty() {
            debug!(name = %company.name, "dropping company with empty key");
            continue;
        }
        if !seen.insert(key.clone()) {
            debug!(%key, "dropping duplicate company");
            continue;
        }
        for dm in &mut company.decision_makers {
            dm.employer = key.clone();
        }
        company.decision_makers = dedupe_decision_makers(std::mem::take(&mut company.decision_makers));
        company.key = key;
        out.push(company);
    }
    out
}

/// Remove decision makers whose lowercase, whitespace-collapsed name was already seen.
pub fn dedupe_decision_makers(people: Vec<DecisionMaker>) -> Vec<DecisionMaker> {
    let mut seen: HashSet<String> = HashSet::new();
    people
        .into_iter()
        .filter(|dm| {
            let key = dm
                .name
                .split_whitespace()
                .map(str::to_lowercase)
                .collect::<Vec<_>>()
                .join(" ");
            !key.is_empty() && seen.insert(key)
        })
        .collect()
}
