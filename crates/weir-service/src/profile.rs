use weir_config::RetrievalProfile;

/// Selects and normalizes retrieval profiles for one query.
///
/// Profiles are copied out on selection and mutated locally by later
/// stages; nothing is ever written back.
pub struct ProfileProvider {
	profiles: Vec<RetrievalProfile>,
}
impl ProfileProvider {
	pub fn new(profiles: Vec<RetrievalProfile>) -> Self {
		Self { profiles }
	}

	pub fn select_by_name(&self, name: &str) -> Option<RetrievalProfile> {
		self.profiles
			.iter()
			.find(|profile| profile.name.eq_ignore_ascii_case(name))
			.map(|profile| self.normalize(profile.clone()))
	}

	pub fn select_by_intent(&self, intent: &str) -> Option<RetrievalProfile> {
		let intent = intent.trim();

		if intent.is_empty() {
			return None;
		}

		self.profiles
			.iter()
			.find(|profile| {
				!profile.intent.is_empty() && profile.intent.eq_ignore_ascii_case(intent)
			})
			.map(|profile| self.normalize(profile.clone()))
	}

	/// Placeholder for query-characteristic selection; currently the
	/// default profile.
	pub fn select_by_query(&self, _query: &str) -> RetrievalProfile {
		self.select_default()
	}

	/// First configured profile, or a vector-only baseline.
	pub fn select_default(&self) -> RetrievalProfile {
		if let Some(profile) = self.profiles.first() {
			return self.normalize(profile.clone());
		}

		self.normalize(RetrievalProfile {
			name: "baseline".to_string(),
			retrievers: vec!["vector".to_string()],
			top_k: 10,
			threshold: 0.5,
			..Default::default()
		})
	}

	/// Fills defaults so downstream stages never see zero knobs.
	pub fn normalize(&self, mut profile: RetrievalProfile) -> RetrievalProfile {
		if profile.top_k == 0 {
			profile.top_k = 10;
		}
		if profile.threshold == 0.0 {
			profile.threshold = 0.5;
		}
		if profile.retrievers.is_empty() {
			profile.retrievers = vec!["vector".to_string()];
		}
		if profile.per_retriever_top_k == 0 {
			profile.per_retriever_top_k = profile.top_k;
		}

		profile
	}

	/// Tightens a profile to fit a latency budget and urgency level.
	pub fn apply_constraints(
		&self,
		mut profile: RetrievalProfile,
		latency_budget_ms: u64,
		urgency: &str,
	) -> RetrievalProfile {
		if latency_budget_ms > 0 {
			if latency_budget_ms < 100 {
				profile.retrievers = vec!["vector".to_string()];
				profile.max_fanout = 1;

				if profile.top_k > 5 {
					profile.top_k = 5;
				}
			} else if latency_budget_ms < 300 {
				profile.retrievers = vec!["vector".to_string(), "bm25".to_string()];
				profile.max_fanout = 2;
				profile.use_web = false;
			}
		}

		let urgency = urgency.trim().to_uppercase();

		if urgency.contains("CRITICAL") || urgency.contains("ELEVATED") {
			if profile.top_k > 10 {
				profile.top_k = 10;
			}

			profile.use_web = false;
		}

		profile
	}

	pub fn apply_intent_requirements(
		&self,
		mut profile: RetrievalProfile,
		requires_web: bool,
		requires_multi_doc: bool,
	) -> RetrievalProfile {
		profile.use_web = requires_web;

		if requires_multi_doc && profile.top_k < 15 {
			profile.top_k = 15;
		}

		profile
	}
}
