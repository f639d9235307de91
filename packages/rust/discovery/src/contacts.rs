//! Decision-maker lookup via professional-profile search results.

use std::sync::LazyLock;

use leadscout_shared::{CompanyType, ContactHandle, DecisionMaker, Result, SearchHit};
use regex::Regex;
use tracing::{debug, instrument};

use crate::SearchProvider;

static PROFILE_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://([a-z]{2,3}\.)?linkedin\.com/in/[^/?#]+").expect("valid regex"));

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\p{L}][\p{L}'.\-]*(\s+[\p{L}][\p{L}'.\-]*){1,4}$").expect("valid regex")
});

/// Titles that make a venture-firm contact worth approaching.
const VC_TITLE_TERMS: &[&str] = &["partner", "principal", "managing director"];

/// Search query that surfaces leadership profiles for `company`.
pub fn contact_query(company: &str, kind: CompanyType) -> String {
    match kind {
        CompanyType::Biotech => format!(
            "\"{company}\" CEO OR founder OR \"chief executive\" OR \"business development\" site:linkedin.com/in"
        ),
        CompanyType::VcFirm => format!(
            "\"{company}\" partner OR principal OR \"managing director\" site:linkedin.com/in"
        ),
    }
}

/// Whether a contact with `title` fits the kind of organization.
///
/// Venture firms keep partners, principals and managing directors only.
pub fn accepts_title(kind: CompanyType, title: &str) -> bool {
    match kind {
        CompanyType::Biotech => true,
        CompanyType::VcFirm => {
            let title = title.to_lowercase();
            VC_TITLE_TERMS.iter().any(|term| title.contains(term))
        }
    }
}

/// Parse a profile result titled like `Jane Doe - Chief Executive Officer - Acme Bio | LinkedIn`.
///
/// Returns `None` unless the link is a profile page and the leading segment reads as a person's name.
pub fn parse_profile_hit(hit: &SearchHit, employer_key: &str) -> Option<DecisionMaker> {
    if !PROFILE_URL_RE.is_match(&hit.link) {
        return None;
    }

    let title = hit
        .title
        .split(" | ")
        .next()
        .unwrap_or_default()
        .replace(" – ", " - ")
        .replace(" — ", " - ");
    let mut parts = title.split(" - ").map(str::trim).filter(|p| !p.is_empty());

    let name = parts.next()?;
    if !NAME_RE.is_match(name) {
        return None;
    }
    let role = parts.next().unwrap_or_default();

    Some(DecisionMaker {
        name: name.to_string(),
        title: role.to_string(),
        employer: employer_key.to_string(),
        contact: ContactHandle::parse(&hit.link),
        research_notes: None,
    })
}

/// Look up to `max` decision makers for one company.
#[instrument(skip(provider), fields(search = provider.name()))]
pub async fn find_decision_makers(
    provider: &dyn SearchProvider,
    company_name: &str,
    employer_key: &str,
    kind: CompanyType,
    max: usize,
) -> Result<Vec<DecisionMaker>> {
    if max == 0 {
        return Ok(Vec::new());
    }
    let hits = provider.search(&contact_query(company_name, kind), max * 2).await?;

    let mut found: Vec<DecisionMaker> = Vec::new();
    let candidates = hits
        .iter()
        .filter_map(|h| parse_profile_hit(h, employer_key))
        .filter(|dm| accepts_title(kind, &dm.title));
    for dm in candidates {
        if found.iter().any(|f| f.name.eq_ignore_ascii_case(&dm.name)) {
            continue;
        }
        found.push(dm);
        if found.len() == max {
            break;
        }
    }
    debug!(company = company_name, found = found.len(), "contact lookup finished");
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn hit(title: &str, link: &str) -> SearchHit {
        SearchHit {
            title: title.into(),
            link: link.into(),
            snippet: String::new(),
            source: None,
        }
    }

    #[test]
    fn parses_name_and_role() {
        let dm = parse_profile_hit(
            &hit(
                "Maria Okafor - Chief Executive Officer - Helix Therapeutics | LinkedIn",
                "https://www.linkedin.com/in/maria-okafor",
            ),
            "helix therapeutics",
        )
        .expect("parsed");
        assert_eq!(dm.name, "Maria Okafor");
        assert_eq!(dm.title, "Chief Executive Officer");
        assert_eq!(dm.employer, "helix therapeutics");
        assert!(matches!(dm.contact, Some(ContactHandle::Profile(_))));
    }

    #[test]
    fn rejects_non_profiles_and_non_names() {
        assert!(parse_profile_hit(&hit("Helix careers", "https://helix.example.com/jobs"), "h").is_none());
        assert!(
            parse_profile_hit(
                &hit("Top 10 biotech CEOs of 2025 you should know", "https://www.linkedin.com/in/x"),
                "h"
            )
            .is_none()
        );
    }

    #[test]
    fn en_dash_separator_accepted() {
        let dm = parse_profile_hit(
            &hit("José Ramírez – VP Business Development", "https://uk.linkedin.com/in/jramirez"),
            "k",
        )
        .expect("parsed");
        assert_eq!(dm.name, "José Ramírez");
        assert_eq!(dm.title, "VP Business Development");
    }

    struct Canned(Vec<SearchHit>);

    #[async_trait]
    impl SearchProvider for Canned {
        fn name(&self) -> &str {
            "canned"
        }
        async fn search(&self, _q: &str, _max: usize) -> Result<Vec<SearchHit>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn lookup_dedupes_and_caps() {
        let provider = Canned(vec![
            hit("Ann Lee - CEO - Acme", "https://www.linkedin.com/in/annlee"),
            hit("ann lee - CEO", "https://www.linkedin.com/in/annlee2"),
            hit("Bo Chen - CBO - Acme", "https://www.linkedin.com/in/bochen"),
            hit("Cy Diaz - CFO - Acme", "https://www.linkedin.com/in/cydiaz"),
        ]);
        let found = find_decision_makers(&provider, "Acme", "acme", CompanyType::Biotech, 2)
            .await
            .expect("lookup");
        let names: Vec<_> = found.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Ann Lee", "Bo Chen"]);
    }

    #[tokio::test]
    async fn venture_lookup_keeps_partners_only() {
        let provider = Canned(vec![
            hit("Rita Gomez - Associate - Atlas Venture", "https://www.linkedin.com/in/rgomez"),
            hit("Paul Ng - General Partner - Atlas Venture", "https://www.linkedin.com/in/paulng"),
            hit("Eva Stone - Managing Director - Atlas Venture", "https://www.linkedin.com/in/evastone"),
        ]);
        let found = find_decision_makers(&provider, "Atlas Venture", "atlas venture", CompanyType::VcFirm, 3)
            .await
            .expect("lookup");
        let names: Vec<_> = found.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Paul Ng", "Eva Stone"]);
    }

    #[test]
    fn venture_query_targets_partners() {
        let q = contact_query("Atlas Venture", CompanyType::VcFirm);
        assert!(q.contains("partner OR principal"));
        assert!(!contact_query("Helix", CompanyType::Biotech).contains("principal"));
        assert!(accepts_title(CompanyType::VcFirm, "Principal, Life Sciences"));
        assert!(!accepts_title(CompanyType::VcFirm, "Analyst"));
        assert!(accepts_title(CompanyType::Biotech, "Analyst"));
    }
}
