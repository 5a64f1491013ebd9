//! Domain resolution for a selected cluster.

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use tabcontext_shared::{Cluster, Domain, DomainResult, Result, TabContextError};

use crate::classifier::{ChatMessage, ClassifierClient};

/// Tab titles included in the free-text request.
const MAX_DIGEST_TITLES: usize = 20;

const SYSTEM_PROMPT: &str = r#"You decide which working context best matches what a user wants to do with a group of browser tabs.

Choose exactly one domain:
- study: learning, research, reading papers or documentation
- shopping: buying, comparing products or prices
- travel: planning trips, flights, hotels, destinations
- code: programming, repositories, debugging, developer tools
- entertainment: watching, listening, playing, browsing for fun
- generic: none of the above

The user's request takes priority over the tab titles.
Respond with strict JSON only: {"domain": "<one of the domains>", "reason": "<one sentence>"}"#;

#[derive(Debug, Deserialize)]
struct ResolveResponse {
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// Resolve the working context for `cluster`.
///
/// A non-blank `user_prompt` is classified by the service; without one, or
/// when that call fails, the cluster's own domain and summary are used.
#[instrument(skip_all, fields(cluster_id = cluster.cluster_id, has_prompt = !user_prompt.trim().is_empty()))]
pub async fn resolve_domain(
    client: &ClassifierClient,
    token: &str,
    cluster: &Cluster,
    user_prompt: &str,
) -> DomainResult {
    let prompt = user_prompt.trim();

    let (domain, summary) = if prompt.is_empty() {
        pass_through(cluster)
    } else {
        match classify_prompt(client, token, cluster, prompt).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(error = %e, "free-text resolution failed, using cluster domain");
                pass_through(cluster)
            }
        }
    };

    info!(domain = %domain, "domain resolved");

    DomainResult {
        domain,
        tabs: cluster.tabs.clone(),
        summary,
        user_prompt: prompt.to_string(),
        timestamp: Utc::now(),
    }
}

fn pass_through(cluster: &Cluster) -> (Domain, String) {
    (Domain::coerce(cluster.domain.as_str()), cluster.summary.clone())
}

async fn classify_prompt(
    client: &ClassifierClient,
    token: &str,
    cluster: &Cluster,
    prompt: &str,
) -> Result<(Domain, String)> {
    let messages = [
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(request_message(cluster, prompt)),
    ];
    let content = client.complete(token, &messages, client.resolve_sampling()).await?;

    let response: ResolveResponse = serde_json::from_str(&content)
        .map_err(|e| TabContextError::parse(format!("resolve response: {e}")))?;

    let domain = response
        .domain
        .as_deref()
        .map(Domain::coerce)
        .ok_or_else(|| TabContextError::parse("resolve response has no domain"))?;

    let summary = response
        .reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| cluster.summary.clone());

    Ok((domain, summary))
}

fn request_message(cluster: &Cluster, prompt: &str) -> String {
    let mut message = format!("User request: {prompt}\n\nTabs in the selected group:\n");
    for tab in cluster.tabs.iter().take(MAX_DIGEST_TITLES) {
        message.push_str(&format!("- {}\n", tab.title));
    }
    if cluster.tabs.len() > MAX_DIGEST_TITLES {
        message.push_str(&format!(
            "- ... and {} more\n",
            cluster.tabs.len() - MAX_DIGEST_TITLES
        ));
    }
    message
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use tabcontext_shared::{ClassifierConfig, TabRecord};

    use super::*;
    use crate::classifier::test_support::completion;

    fn tab(id: i64, title: &str) -> TabRecord {
        TabRecord {
            id,
            title: title.into(),
            url: format!("https://example.com/{id}"),
            content: String::new(),
            page: None,
        }
    }

    fn study_cluster() -> Cluster {
        Cluster {
            cluster_id: 0,
            tabs: vec![tab(1, "Attention Is All You Need"), tab(2, "BERT")],
            domain: Domain::Study,
            summary: "ML papers".into(),
            cluster_name: "Research".into(),
        }
    }

    fn shopping_cluster() -> Cluster {
        Cluster {
            cluster_id: 3,
            tabs: vec![tab(5, "ThinkPad X1 Carbon"), tab(6, "MacBook Air M3")],
            domain: Domain::Shopping,
            summary: "Laptop listings".into(),
            cluster_name: "Laptops".into(),
        }
    }

    fn client_for(server: &MockServer) -> ClassifierClient {
        ClassifierClient::new(&ClassifierConfig {
            endpoint: server.uri(),
            ..Default::default()
        })
        .expect("client")
    }

    #[tokio::test]
    async fn empty_prompt_passes_cluster_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(completion(json!({"domain": "code", "reason": "x"})))
            .expect(0)
            .mount(&server)
            .await;

        let cluster = study_cluster();
        let result = resolve_domain(&client_for(&server), "tok", &cluster, "   ").await;

        assert_eq!(result.domain, Domain::Study);
        assert_eq!(result.tabs, cluster.tabs);
        assert_eq!(result.summary, "ML papers");
        assert_eq!(result.user_prompt, "");
    }

    #[tokio::test]
    async fn free_text_prompt_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("compare laptop prices"))
            .and(body_string_contains("ThinkPad X1 Carbon"))
            .respond_with(completion(json!({
                "domain": "shopping", "reason": "user wants price comparison"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cluster = shopping_cluster();
        let result = resolve_domain(
            &client_for(&server),
            "tok",
            &cluster,
            "  compare laptop prices ",
        )
        .await;

        assert_eq!(result.domain, Domain::Shopping);
        assert_eq!(result.summary, "user wants price comparison");
        assert_eq!(result.user_prompt, "compare laptop prices");
        assert_eq!(result.tabs, cluster.tabs);
    }

    #[tokio::test]
    async fn unknown_domain_is_coerced_and_missing_reason_uses_cluster_summary() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(completion(json!({"domain": "finance"})))
            .mount(&server)
            .await;

        let cluster = shopping_cluster();
        let result = resolve_domain(&client_for(&server), "tok", &cluster, "track my budget").await;

        assert_eq!(result.domain, Domain::Generic);
        assert_eq!(result.summary, "Laptop listings");
    }

    #[tokio::test]
    async fn service_failure_falls_through_to_cluster() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let cluster = study_cluster();
        let result = resolve_domain(&client_for(&server), "tok", &cluster, "help me revise").await;

        assert_eq!(result.domain, Domain::Study);
        assert_eq!(result.summary, "ML papers");
        assert_eq!(result.user_prompt, "help me revise");
    }

    #[tokio::test]
    async fn response_without_domain_falls_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(completion(json!({"reason": "unsure"})))
            .mount(&server)
            .await;

        let result = resolve_domain(&client_for(&server), "tok", &study_cluster(), "hmm").await;
        assert_eq!(result.domain, Domain::Study);
        assert_eq!(result.summary, "ML papers");
    }

    #[test]
    fn request_digest_caps_titles() {
        let mut cluster = study_cluster();
        cluster.tabs = (0..25).map(|i| tab(i, &format!("Tab title {i}"))).collect();

        let message = request_message(&cluster, "study for exam");
        assert!(message.starts_with("User request: study for exam"));
        assert!(message.contains("- Tab title 19\n"));
        assert!(!message.contains("Tab title 20"));
        assert!(message.contains("and 5 more"));
    }
}
