use crate::error::PageProofError;

/// All tunables for the ingestion pipeline and the QA engine.
///
/// One field per configuration key in the original service's `Settings`,
/// with the same defaults. Build with [`SettingsBuilder`] or load overrides
/// from the environment with [`Settings::from_env`].
#[derive(Debug, Clone)]
pub struct Settings {
    pub upload_dir: String,
    pub max_upload_bytes: u64,

    pub ocr_fallback_enabled: bool,
    pub ocr_trigger_min_words: usize,
    pub ocr_trigger_min_alnum_ratio: f64,
    pub ocr_language: String,
    pub ocr_dpi: u32,
    pub ocr_full_page: bool,
    pub ocr_tessdata: Option<String>,

    pub openai_embedding_model: String,
    pub openai_embedding_dimensions: usize,
    pub openai_chat_model: String,
    pub openai_api_key: Option<String>,

    pub retrieval_top_k: usize,
    pub retrieval_max_context_chunks: usize,
    pub retrieval_max_vector_distance: f64,
    pub retrieval_min_keyword_overlap: u32,

    pub evidence_question_weight: f64,
    pub evidence_answer_weight: f64,
    pub evidence_relative_score_threshold: f64,
    pub evidence_drop_ratio_stop: f64,
    pub evidence_min_absolute_score: f64,
    pub answer_max_evidence_items: usize,
    pub minimum_evidence_items: usize,
    pub require_llm_citations: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upload_dir: "uploads".to_string(),
            max_upload_bytes: 52_428_800,

            ocr_fallback_enabled: true,
            ocr_trigger_min_words: 18,
            ocr_trigger_min_alnum_ratio: 0.60,
            ocr_language: "eng".to_string(),
            ocr_dpi: 300,
            ocr_full_page: true,
            ocr_tessdata: None,

            openai_embedding_model: "text-embedding-3-small".to_string(),
            openai_embedding_dimensions: 1536,
            openai_chat_model: "gpt-5-mini".to_string(),
            openai_api_key: None,

            retrieval_top_k: 8,
            retrieval_max_context_chunks: 6,
            retrieval_max_vector_distance: 1.2,
            retrieval_min_keyword_overlap: 1,

            evidence_question_weight: 0.2,
            evidence_answer_weight: 0.8,
            evidence_relative_score_threshold: 0.60,
            evidence_drop_ratio_stop: 0.72,
            evidence_min_absolute_score: 0.20,
            answer_max_evidence_items: 0,
            minimum_evidence_items: 1,
            require_llm_citations: true,
        }
    }
}

impl Settings {
    #[must_use]
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Load overrides from `PAGEPROOF_*` environment variables on top of
    /// [`Settings::default`]. Unset variables keep the default; a set but
    /// unparseable variable is a [`PageProofError::ConfigurationError`].
    pub fn from_env() -> Result<Self, PageProofError> {
        let mut settings = Self::default();

        macro_rules! env_string {
            ($key:literal, $field:expr) => {
                if let Ok(v) = std::env::var(concat!("PAGEPROOF_", $key)) {
                    $field = v;
                }
            };
        }
        macro_rules! env_parsed {
            ($key:literal, $field:expr) => {
                if let Ok(v) = std::env::var(concat!("PAGEPROOF_", $key)) {
                    $field = v.parse().map_err(|_| {
                        PageProofError::ConfigurationError(format!(
                            concat!("invalid value for PAGEPROOF_", $key, ": {}"),
                            v
                        ))
                    })?;
                }
            };
        }

        env_string!("UPLOAD_DIR", settings.upload_dir);
        env_parsed!("MAX_UPLOAD_BYTES", settings.max_upload_bytes);

        env_parsed!("OCR_FALLBACK_ENABLED", settings.ocr_fallback_enabled);
        env_parsed!("OCR_TRIGGER_MIN_WORDS", settings.ocr_trigger_min_words);
        env_parsed!(
            "OCR_TRIGGER_MIN_ALNUM_RATIO",
            settings.ocr_trigger_min_alnum_ratio
        );
        env_string!("OCR_LANGUAGE", settings.ocr_language);
        env_parsed!("OCR_DPI", settings.ocr_dpi);
        env_parsed!("OCR_FULL_PAGE", settings.ocr_full_page);
        if let Ok(v) = std::env::var("PAGEPROOF_OCR_TESSDATA") {
            settings.ocr_tessdata = Some(v);
        }

        env_string!("OPENAI_EMBEDDING_MODEL", settings.openai_embedding_model);
        env_parsed!(
            "OPENAI_EMBEDDING_DIMENSIONS",
            settings.openai_embedding_dimensions
        );
        env_string!("OPENAI_CHAT_MODEL", settings.openai_chat_model);
        if let Ok(v) = std::env::var("PAGEPROOF_OPENAI_API_KEY") {
            settings.openai_api_key = Some(v);
        }

        env_parsed!("RETRIEVAL_TOP_K", settings.retrieval_top_k);
        env_parsed!(
            "RETRIEVAL_MAX_CONTEXT_CHUNKS",
            settings.retrieval_max_context_chunks
        );
        env_parsed!(
            "RETRIEVAL_MAX_VECTOR_DISTANCE",
            settings.retrieval_max_vector_distance
        );
        env_parsed!(
            "RETRIEVAL_MIN_KEYWORD_OVERLAP",
            settings.retrieval_min_keyword_overlap
        );

        env_parsed!("EVIDENCE_QUESTION_WEIGHT", settings.evidence_question_weight);
        env_parsed!("EVIDENCE_ANSWER_WEIGHT", settings.evidence_answer_weight);
        env_parsed!(
            "EVIDENCE_RELATIVE_SCORE_THRESHOLD",
            settings.evidence_relative_score_threshold
        );
        env_parsed!("EVIDENCE_DROP_RATIO_STOP", settings.evidence_drop_ratio_stop);
        env_parsed!(
            "EVIDENCE_MIN_ABSOLUTE_SCORE",
            settings.evidence_min_absolute_score
        );
        env_parsed!(
            "ANSWER_MAX_EVIDENCE_ITEMS",
            settings.answer_max_evidence_items
        );
        env_parsed!("MINIMUM_EVIDENCE_ITEMS", settings.minimum_evidence_items);
        env_parsed!("REQUIRE_LLM_CITATIONS", settings.require_llm_citations);

        Ok(settings)
    }

    /// Normalized `(question_weight, answer_weight)`, falling back to the
    /// defaults `(0.2, 0.8)` when both configured weights are zero.
    #[must_use]
    pub fn evidence_weights(&self) -> (f64, f64) {
        let q = self.evidence_question_weight;
        let a = self.evidence_answer_weight;
        let sum = q + a;
        if sum <= 0.0 {
            (0.2, 0.8)
        } else {
            (q / sum, a / sum)
        }
    }
}

/// Programmatic builder over [`Settings`].
#[derive(Debug, Clone, Default)]
pub struct SettingsBuilder {
    settings: OptionalSettings,
}

#[derive(Debug, Clone, Default)]
struct OptionalSettings {
    upload_dir: Option<String>,
    max_upload_bytes: Option<u64>,
    ocr_fallback_enabled: Option<bool>,
    ocr_trigger_min_words: Option<usize>,
    ocr_trigger_min_alnum_ratio: Option<f64>,
    ocr_language: Option<String>,
    ocr_dpi: Option<u32>,
    ocr_full_page: Option<bool>,
    ocr_tessdata: Option<String>,
    openai_embedding_model: Option<String>,
    openai_embedding_dimensions: Option<usize>,
    openai_chat_model: Option<String>,
    openai_api_key: Option<String>,
    retrieval_top_k: Option<usize>,
    retrieval_max_context_chunks: Option<usize>,
    retrieval_max_vector_distance: Option<f64>,
    retrieval_min_keyword_overlap: Option<u32>,
    evidence_question_weight: Option<f64>,
    evidence_answer_weight: Option<f64>,
    evidence_relative_score_threshold: Option<f64>,
    evidence_drop_ratio_stop: Option<f64>,
    evidence_min_absolute_score: Option<f64>,
    answer_max_evidence_items: Option<usize>,
    minimum_evidence_items: Option<usize>,
    require_llm_citations: Option<bool>,
}

macro_rules! builder_setter {
    ($name:ident, $ty:ty) => {
        #[must_use]
        pub fn $name(mut self, value: $ty) -> Self {
            self.settings.$name = Some(value);
            self
        }
    };
}

impl SettingsBuilder {
    builder_setter!(upload_dir, String);
    builder_setter!(max_upload_bytes, u64);
    builder_setter!(ocr_fallback_enabled, bool);
    builder_setter!(ocr_trigger_min_words, usize);
    builder_setter!(ocr_trigger_min_alnum_ratio, f64);
    builder_setter!(ocr_language, String);
    builder_setter!(ocr_dpi, u32);
    builder_setter!(ocr_full_page, bool);
    builder_setter!(openai_embedding_model, String);
    builder_setter!(openai_embedding_dimensions, usize);
    builder_setter!(openai_chat_model, String);
    builder_setter!(openai_api_key, String);
    builder_setter!(retrieval_top_k, usize);
    builder_setter!(retrieval_max_context_chunks, usize);
    builder_setter!(retrieval_max_vector_distance, f64);
    builder_setter!(retrieval_min_keyword_overlap, u32);
    builder_setter!(evidence_question_weight, f64);
    builder_setter!(evidence_answer_weight, f64);
    builder_setter!(evidence_relative_score_threshold, f64);
    builder_setter!(evidence_drop_ratio_stop, f64);
    builder_setter!(evidence_min_absolute_score, f64);
    builder_setter!(answer_max_evidence_items, usize);
    builder_setter!(minimum_evidence_items, usize);
    builder_setter!(require_llm_citations, bool);

    #[must_use]
    pub fn ocr_tessdata(mut self, value: impl Into<String>) -> Self {
        self.settings.ocr_tessdata = Some(value.into());
        self
    }

    #[must_use]
    pub fn build(self) -> Settings {
        let defaults = Settings::default();
        let s = self.settings;
        Settings {
            upload_dir: s.upload_dir.unwrap_or(defaults.upload_dir),
            max_upload_bytes: s.max_upload_bytes.unwrap_or(defaults.max_upload_bytes),
            ocr_fallback_enabled: s.ocr_fallback_enabled.unwrap_or(defaults.ocr_fallback_enabled),
            ocr_trigger_min_words: s
                .ocr_trigger_min_words
                .unwrap_or(defaults.ocr_trigger_min_words),
            ocr_trigger_min_alnum_ratio: s
                .ocr_trigger_min_alnum_ratio
                .unwrap_or(defaults.ocr_trigger_min_alnum_ratio),
            ocr_language: s.ocr_language.unwrap_or(defaults.ocr_language),
            ocr_dpi: s.ocr_dpi.unwrap_or(defaults.ocr_dpi),
            ocr_full_page: s.ocr_full_page.unwrap_or(defaults.ocr_full_page),
            ocr_tessdata: s.ocr_tessdata.or(defaults.ocr_tessdata),
            openai_embedding_model: s
                .openai_embedding_model
                .unwrap_or(defaults.openai_embedding_model),
            openai_embedding_dimensions: s
                .openai_embedding_dimensions
                .unwrap_or(defaults.openai_embedding_dimensions),
            openai_chat_model: s.openai_chat_model.unwrap_or(defaults.openai_chat_model),
            openai_api_key: s.openai_api_key.or(defaults.openai_api_key),
            retrieval_top_k: s.retrieval_top_k.unwrap_or(defaults.retrieval_top_k),
            retrieval_max_context_chunks: s
                .retrieval_max_context_chunks
                .unwrap_or(defaults.retrieval_max_context_chunks),
            retrieval_max_vector_distance: s
                .retrieval_max_vector_distance
                .unwrap_or(defaults.retrieval_max_vector_distance),
            retrieval_min_keyword_overlap: s
                .retrieval_min_keyword_overlap
                .unwrap_or(defaults.retrieval_min_keyword_overlap),
            evidence_question_weight: s
                .evidence_question_weight
                .unwrap_or(defaults.evidence_question_weight),
            evidence_answer_weight: s
                .evidence_answer_weight
                .unwrap_or(defaults.evidence_answer_weight),
            evidence_relative_score_threshold: s
                .evidence_relative_score_threshold
                .unwrap_or(defaults.evidence_relative_score_threshold),
            evidence_drop_ratio_stop: s
                .evidence_drop_ratio_stop
                .unwrap_or(defaults.evidence_drop_ratio_stop),
            evidence_min_absolute_score: s
                .evidence_min_absolute_score
                .unwrap_or(defaults.evidence_min_absolute_score),
            answer_max_evidence_items: s
                .answer_max_evidence_items
                .unwrap_or(defaults.answer_max_evidence_items),
            minimum_evidence_items: s
                .minimum_evidence_items
                .unwrap_or(defaults.minimum_evidence_items),
            require_llm_citations: s
                .require_llm_citations
                .unwrap_or(defaults.require_llm_citations),
        }
    }
}
