//! L4 — domain router: deterministic mapping from intent (+ raw text) to
//! a domain. No model call; table order is the tie-break.

use chat_core::types::{Domain, Intent, QuestionType, Topic};

/// Table order matters: it is the deterministic tie-break when two
/// domains tie on keyword-hit count. Specific project names are listed
/// here with enough entries to always win `projects` over a looser
/// `chat_system` topic guess (the router keyword-priority regression).
const KEYWORD_TABLE: &[(Domain, &[&str])] = &[
    (
        Domain::Projects,
        &["cairn", "project", "github", "repo", "built", "built a", "side project"],
    ),
    (
        Domain::Professional,
        &["experience", "work", "job", "career", "skills", "programming", "languages", "employer"],
    ),
    (Domain::Hobbies, &["hobby", "hobbies", "free time", "weekend", "outside of work"]),
    (Domain::Philosophy, &["philosophy", "believe", "values", "worldview", "meaning"]),
    (Domain::Linkedin, &["linkedin", "resume", "cv", "profile"]),
];

fn topic_table(topic: Topic) -> Option<Domain> {
    match topic {
        Topic::WorkExperience | Topic::Skills => Some(Domain::Professional),
        Topic::Projects => Some(Domain::Projects),
        Topic::Hobbies => Some(Domain::Hobbies),
        Topic::Philosophy => Some(Domain::Philosophy),
        Topic::Contact | Topic::Message => Some(Domain::Meta),
        Topic::ChatSystem => None,
        Topic::General | Topic::Greeting => None,
    }
}

pub struct RoutingResult {
    pub domain: Domain,
    pub confidence: f64,
}

pub fn route(intent: &Intent, raw_message: &str) -> RoutingResult {
    if intent.question_type == QuestionType::Greeting {
        return RoutingResult { domain: Domain::Meta, confidence: 1.0 };
    }

    if let Some(domain) = topic_table(intent.topic) {
        return RoutingResult { domain, confidence: intent.confidence };
    }

    let haystack = format!(
        "{} {}",
        raw_message.to_lowercase(),
        intent.entities.join(" ").to_lowercase()
    );

    let mut best: Option<(Domain, usize)> = None;
    for (domain, keywords) in KEYWORD_TABLE {
        let hits = keywords.iter().filter(|kw| haystack.contains(*kw)).count();
        if hits == 0 {
            continue;
        }
        match &best {
            Some((_, best_hits)) if hits <= *best_hits => {}
            _ => best = Some((*domain, hits)),
        }
    }

    if let Some((domain, hits)) = best {
        let confidence = (intent.confidence + 0.1 * hits as f64).min(0.8);
        return RoutingResult { domain, confidence };
    }

    if intent.topic == Topic::General && intent.confidence >= 0.5 {
        return RoutingResult { domain: Domain::Professional, confidence: intent.confidence };
    }

    RoutingResult { domain: Domain::OutOfScope, confidence: intent.confidence }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(topic: Topic, question_type: QuestionType, confidence: f64, entities: &[&str]) -> Intent {
        Intent {
            topic,
            question_type,
            entities: entities.iter().map(|s| s.to_string()).collect(),
            emotional_tone: "neutral".into(),
            confidence,
        }
    }

    #[test]
    fn greeting_question_type_routes_to_meta() {
        let result = route(&intent(Topic::General, QuestionType::Greeting, 0.9, &[]), "hi there");
        assert_eq!(result.domain, Domain::Meta);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn topic_table_hit_routes_directly() {
        let result = route(&intent(Topic::Skills, QuestionType::Factual, 0.7, &[]), "what languages do you know");
        assert_eq!(result.domain, Domain::Professional);
    }

    #[test]
    fn project_name_wins_over_chat_system_topic() {
        let result = route(
            &intent(Topic::ChatSystem, QuestionType::Factual, 0.6, &[]),
            "What is CAIRN?",
        );
        assert_eq!(result.domain, Domain::Projects);
    }

    #[test]
    fn unmatched_general_topic_with_high_confidence_defaults_professional() {
        let result = route(&intent(Topic::General, QuestionType::Factual, 0.6, &[]), "tell me something");
        assert_eq!(result.domain, Domain::Professional);
    }

    #[test]
    fn unmatched_low_confidence_is_out_of_scope() {
        let result = route(&intent(Topic::General, QuestionType::Factual, 0.2, &[]), "what's the weather");
        assert_eq!(result.domain, Domain::OutOfScope);
    }
}
