use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use weir_domain::{Document, META_SOURCE, META_TITLE, META_URL, SearchResult};

use crate::{
	Error, HttpClient, Result,
	retriever::{Retriever, annotate},
};

const DEFAULT_DUCKDUCKGO_ENDPOINT: &str = "https://api.duckduckgo.com/";
const WEB_SOURCE: &str = "web_search";
const MAX_TITLE_CHARS: usize = 100;

/// One raw web search hit before conversion to a document.
#[derive(Clone, Debug)]
struct WebHit {
	title: String,
	url: String,
	snippet: String,
}

/// Provider-backed web search, shared by the web retriever and the
/// corrective actions.
///
/// `provider` selects the backend: `duckduckgo` (instant-answer API, also
/// the fallback for unknown providers) or `bing` (Web Search v7, requires
/// endpoint and API key).
pub struct WebSearcher {
	pub provider: String,
	pub endpoint: String,
	pub api_key: String,
	pub client: Arc<HttpClient>,
}
impl WebSearcher {
	pub async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchResult>> {
		let count = if count > 0 { count } else { 3 };
		let hits = match self.provider.as_str() {
			"bing" => self.search_bing(query, count).await?,
			"duckduckgo" => self.search_duckduckgo(query, count).await?,
			other => {
				if !other.is_empty() {
					tracing::warn!(provider = other, "Unknown web provider, using DuckDuckGo.");
				}

				self.search_duckduckgo(query, count).await?
			},
		};
		let mut out = Vec::with_capacity(hits.len());

		for hit in hits {
			let mut document = Document::new(hit.url.clone(), hit.snippet);

			document.set_metadata(META_TITLE, hit.title);
			document.set_metadata(META_URL, hit.url);
			document.set_metadata(META_SOURCE, WEB_SOURCE);
			out.push(SearchResult::new(document, 0.0));
		}

		Ok(out)
	}

	async fn search_duckduckgo(&self, query: &str, count: usize) -> Result<Vec<WebHit>> {
		let endpoint = if self.endpoint.is_empty() {
			DEFAULT_DUCKDUCKGO_ENDPOINT
		} else {
			self.endpoint.as_str()
		};
		let request = self
			.client
			.get(endpoint)
			.query(&[("q", query), ("format", "json")])
			.header("User-Agent", "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
			.build()?;
		let response = self.client.execute(request).await?;

		if !response.status().is_success() {
			return Err(Error::UnexpectedStatus {
				status: response.status().as_u16(),
				url: endpoint.to_string(),
			});
		}

		let parsed: DuckDuckGoResponse = response.json().await?;

		Ok(duckduckgo_hits(parsed, count))
	}

	async fn search_bing(&self, query: &str, count: usize) -> Result<Vec<WebHit>> {
		if self.endpoint.is_empty() {
			return Err(Error::not_configured("Bing search requires an endpoint."));
		}
		if self.api_key.is_empty() {
			return Err(Error::not_configured("Bing search requires an API key."));
		}

		let request = self
			.client
			.get(&self.endpoint)
			.query(&[("q", query.to_string()), ("count", count.to_string())])
			.header("Ocp-Apim-Subscription-Key", &self.api_key)
			.build()?;
		let response = self.client.execute(request).await?;

		if !response.status().is_success() {
			return Err(Error::UnexpectedStatus {
				status: response.status().as_u16(),
				url: self.endpoint.clone(),
			});
		}

		let parsed: BingResponse = response.json().await?;
		let hits = parsed
			.web_pages
			.value
			.into_iter()
			.map(|page| WebHit { title: page.name, url: page.url, snippet: page.snippet })
			.collect();

		Ok(hits)
	}
}

/// Web search exposed through the uniform retriever contract.
pub struct WebSearchRetriever {
	searcher: WebSearcher,
	max_top_k: usize,
}
impl WebSearchRetriever {
	pub fn new(searcher: WebSearcher, max_top_k: usize) -> Self {
		Self { searcher, max_top_k }
	}
}
#[async_trait]
impl Retriever for WebSearchRetriever {
	fn kind(&self) -> &'static str {
		"web"
	}

	async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
		let mut top_k = if top_k > 0 { top_k } else { 10 };

		if self.max_top_k > 0 && self.max_top_k < top_k {
			top_k = self.max_top_k;
		}

		let mut results = self.searcher.search(query, top_k).await?;

		annotate(&mut results, self.kind());

		Ok(results)
	}
}

#[derive(Debug, Default, Deserialize)]
struct DuckDuckGoResponse {
	#[serde(rename = "AbstractText", default)]
	abstract_text: String,
	#[serde(rename = "AbstractSource", default)]
	abstract_source: String,
	#[serde(rename = "AbstractURL", default)]
	abstract_url: String,
	#[serde(rename = "RelatedTopics", default)]
	related_topics: Vec<DuckDuckGoTopic>,
}

#[derive(Debug, Default, Deserialize)]
struct DuckDuckGoTopic {
	#[serde(rename = "Text", default)]
	text: String,
	#[serde(rename = "FirstURL", default)]
	first_url: String,
}

#[derive(Debug, Default, Deserialize)]
struct BingResponse {
	#[serde(rename = "webPages", default)]
	web_pages: BingWebPages,
}

#[derive(Debug, Default, Deserialize)]
struct BingWebPages {
	#[serde(default)]
	value: Vec<BingPage>,
}

#[derive(Debug, Default, Deserialize)]
struct BingPage {
	#[serde(default)]
	name: String,
	#[serde(default)]
	url: String,
	#[serde(default)]
	snippet: String,
}

fn duckduckgo_hits(response: DuckDuckGoResponse, count: usize) -> Vec<WebHit> {
	let mut hits = Vec::with_capacity(count);

	if !response.abstract_text.is_empty() {
		hits.push(WebHit {
			title: response.abstract_source,
			url: response.abstract_url,
			snippet: response.abstract_text,
		});
	}

	for topic in response.related_topics {
		if hits.len() >= count {
			break;
		}
		if topic.text.is_empty() || topic.first_url.is_empty() {
			continue;
		}

		let title = topic.text.chars().take(MAX_TITLE_CHARS).collect();

		hits.push(WebHit { title, url: topic.first_url, snippet: topic.text });
	}

	hits
}
