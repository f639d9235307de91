//! Fit scoring and ranking.

use leadscout_llm::{LlmClient, Prompt, ResponseSchema};
use leadscout_shared::{Company, CompanyType, Result};
use serde::Deserialize;
use tracing::instrument;

const SYSTEM: &str = "You rate how promising a biotech company is as a licensing or partnering \
lead for a pharmaceutical business-development team. Favor companies with failed, terminated or \
stalled programs in the queried area, reachable decision makers, and a focused pipeline. Venture \
firms are rated on how many portfolio companies in the queried area could need partnering.";

#[derive(Debug, Deserialize)]
struct ScoreReply {
    fit_score: f64,
    reason: String,
}

/// Deterministic fallback score used when the model call fails.
pub fn rule_score(company: &Company, query: &str) -> (i64, String) {
    let mut score = 30;
    let mut reasons = Vec::new();

    if company.trial.as_ref().is_some_and(|t| t.status.is_failed()) {
        score += 25;
        reasons.push("failed or terminated trial");
    }
    if company.company_type == CompanyType::VcFirm {
        score += 20;
        reasons.push("venture firm with biotech portfolio");
    }
    let query = query.trim().to_lowercase();
    if !query.is_empty()
        && company
            .therapeutic_areas
            .iter()
            .any(|area| query.contains(area.as_str()) || area.contains(query.as_str()))
    {
        score += 15;
        reasons.push("therapeutic area matches query");
    }
    if !company.decision_makers.is_empty() {
        score += 15;
        reasons.push("decision makers identified");
    }
    if company.website.is_some() {
        score += 10;
        reasons.push("website known");
    }
    if company.overview.is_some() {
        score += 5;
        reasons.push("overview available");
    }

    let reason = if reasons.is_empty() {
        "rule-based: baseline".to_string()
    } else {
        format!("rule-based: {}", reasons.join(", "))
    };
    (score, reason)
}

fn describe(company: &Company) -> String {
    let mut out = format!("Company: {}\nType: {}\n", company.name, company.company_type);
    if let Some(site) = &company.website {
        out.push_str(&format!("Website: {site}\n"));
    }
    if !company.therapeutic_areas.is_empty() {
        let areas: Vec<_> = company.therapeutic_areas.iter().map(String::as_str).collect();
        out.push_str(&format!("Therapeutic areas: {}\n", areas.join(", ")));
    }
    if let Some(overview) = &company.overview {
        out.push_str(&format!("Overview: {overview}\n"));
    }
    if let Some(t) = &company.trial {
        out.push_str(&format!(
            "Trial: {} {} ({}, {})\n",
            t.id,
            t.title,
            t.status,
            t.phase.as_deref().unwrap_or("phase n/a")
        ));
        if let Some(why) = &t.why_stopped {
            out.push_str(&format!("Why stopped: {why}\n"));
        }
    }
    out.push_str(&format!("Decision makers found: {}\n", company.decision_makers.len()));
    out
}

/// Ask the model for a fit score. The returned value is already clamped.
#[instrument(skip_all, fields(company = %company.key))]
pub async fn score_company(llm: &LlmClient, company: &Company, query: &str) -> Result<(i64, String)> {
    let schema = ResponseSchema::object(
        &["fit_score", "reason"],
        r#"{"fit_score": <integer 0-100>, "reason": "<one sentence>"}"#,
    );
    let prompt = Prompt::new(SYSTEM, format!("Query: {query}\n\n{}", describe(company)));
    let reply: ScoreReply = llm.complete_as(&prompt, &schema).await?;
    let score = if reply.fit_score.is_finite() {
        reply.fit_score.round() as i64
    } else {
        0
    };
    Ok((score.clamp(0, 100), reply.reason))
}

/// Order by score descending (stable) and keep the first `limit`.
pub fn rank(mut companies: Vec<Company>, limit: usize) -> Vec<Company> {
    companies.sort_by(|a, b| b.fit_score.cmp(&a.fit_score));
    companies.truncate(limit);
    companies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{company, failed_trial, llm_with};
    use leadscout_shared::{DecisionMaker, parse_website};

    #[test]
    fn rule_score_accumulates() {
        let mut c = company("Helix Therapeutics");
        c.therapeutic_areas.insert("obesity".into());
        c.trial = Some(failed_trial("NCT04811234"));
        c.website = parse_website("helixtx.example.com");
        c.overview = Some("oral peptides".into());
        c.decision_makers.push(DecisionMaker {
            name: "Maria Okafor".into(),
            title: "CEO".into(),
            employer: c.key.clone(),
            contact: None,
            research_notes: None,
        });
        let (score, reason) = rule_score(&c, "obesity phase 2 failures");
        assert_eq!(score, 100);
        assert!(reason.starts_with("rule-based"));

        let (bare, _) = rule_score(&company("Nothing Known"), "obesity");
        assert_eq!(bare, 30);
    }

    #[test]
    fn rank_is_stable_and_truncates() {
        let mut out = Vec::new();
        for (name, score) in [("a", 50), ("b", 80), ("c", 50), ("d", 10)] {
            let mut c = company(name);
            c.fit_score = score;
            out.push(c);
        }
        let ranked = rank(out, 3);
        let names: Vec<_> = ranked.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn model_score_is_clamped() {
        let llm = llm_with(vec![Ok(r#"{"fit_score": 140, "reason": "great"}"#.into())]);
        let (score, reason) = score_company(&llm, &company("Acme"), "obesity").await.unwrap();
        assert_eq!(score, 100);
        assert_eq!(reason, "great");

        let llm = llm_with(vec![Ok(r#"{"fit_score": -12.6, "reason": "poor"}"#.into())]);
        let (score, _) = score_company(&llm, &company("Acme"), "obesity").await.unwrap();
        assert_eq!(score, 0);
    }

    #[test]
    fn venture_firm_rule_score() {
        let mut firm = company("Atlas Venture");
        firm.company_type = CompanyType::VcFirm;
        firm.website = parse_website("atlasventure.example.com");
        firm.decision_makers.push(DecisionMaker {
            name: "Paul Ng".into(),
            title: "Partner".into(),
            employer: firm.key.clone(),
            contact: None,
            research_notes: None,
        });
        let (score, reason) = rule_score(&firm, "oncology");
        assert_eq!(score, 75);
        assert!(reason.contains("venture firm"));
    }

    #[tokio::test]
    async fn mistyped_score_is_asked_again() {
        let llm = llm_with(vec![
            Ok(r#"{"fit_score": "high", "reason": "vague"}"#.into()),
            Ok(r#"{"fit_score": 58, "reason": "stalled phase 2"}"#.into()),
        ]);
        let (score, reason) = score_company(&llm, &company("Acme"), "obesity").await.unwrap();
        assert_eq!(score, 58);
        assert_eq!(reason, "stalled phase 2");
    }
}
