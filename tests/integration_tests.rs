use std::path::PathBuf;
use tempfile::TempDir;
use transformers_auto::{Family, PreTrainedModel, PretrainedConfig};

/// A directory `name` inside a fresh temporary root. Only hex digits are random,
/// so the path carries no family marker besides the one in `name`.
fn scratch(name: &str) -> (TempDir, PathBuf) {
    let root = tempfile::Builder::new()
        .prefix(&format!("models-{}", uuid::Uuid::new_v4().simple()))
        .rand_bytes(0)
        .tempdir()
        .unwrap();
    let dir = root.path().join(name);
    std::fs::create_dir_all(&dir).unwrap();
    (root, dir)
}

fn tiny(family: Family) -> PretrainedConfig {
    PretrainedConfig::builder(family)
        .vocab_size(32)
        .hidden_size(8)
        .intermediate_size(16)
        .num_hidden_layers(2)
        .num_attention_heads(2)
        .max_position_embeddings(16)
        .build()
        .unwrap()
}

mod test_identifier_resolution {
    use super::*;
    use transformers_auto::auto;
    use transformers_auto::{ConfigOptions, Error, LocalStore};

    #[test]
    fn test_every_marker_selects_its_family() {
        for family in Family::MARKER_ORDER {
            let (_root, dir) = scratch(&format!("{}-tiny", family.marker()));
            std::fs::write(dir.join("config.json"), "{}").unwrap();
            let identifier = dir.to_str().unwrap();

            assert_eq!(auto::resolve_family(identifier).unwrap(), family);
            let resolved = auto::config_from_pretrained_with(&LocalStore::new(), identifier, &ConfigOptions::default()).unwrap();
            assert_eq!(resolved.config.family, family);
        }
    }

    #[test]
    fn test_specific_marker_beats_generic() {
        let cases = [
            ("camembert-base", Family::Camembert),
            ("xlm-roberta-large", Family::XlmRoberta),
            ("distilbert-base-uncased", Family::DistilBert),
            ("flaubert-base-cased", Family::Flaubert),
            ("albert-base-v2", Family::Albert),
            ("google/mobilebert-uncased", Family::MobileBert),
            ("roberta-base", Family::Roberta),
            ("xlm-mlm-en-2048", Family::Xlm),
            ("bert-base-uncased", Family::Bert),
            ("distilgpt2", Family::Gpt2),
        ];
        for (identifier, family) in cases {
            assert_eq!(auto::resolve_family(identifier).unwrap(), family, "{}", identifier);
        }
    }

    #[test]
    fn test_no_marker_is_a_resolution_error() {
        let err = auto::resolve_family("some-org/mystery-model").unwrap_err();
        assert!(matches!(err, Error::UnrecognizedIdentifier { .. }));
        let message = err.to_string();
        assert!(message.contains("some-org/mystery-model"));
        assert!(message.contains(&Family::markers().join(", ")));
    }

    #[test]
    fn test_overrides_are_rejected_or_returned() {
        let (_root, dir) = scratch("gpt2-small");
        std::fs::write(dir.join("config.json"), r#"{"n_embd": 16, "n_head": 2, "n_layer": 1}"#).unwrap();
        let identifier = dir.to_str().unwrap();

        let strict = ConfigOptions::default().with_override("n_layer", 3).with_override("made_up", true);
        assert!(matches!(
            auto::config_from_pretrained_with(&LocalStore::new(), identifier, &strict),
            Err(Error::UnknownOverrides(_))
        ));

        let lenient = strict.returning_unused();
        let resolved = auto::config_from_pretrained_with(&LocalStore::new(), identifier, &lenient).unwrap();
        assert_eq!(resolved.config.num_hidden_layers, 3);
        assert_eq!(resolved.config.hidden_size, 16);
        assert!(resolved.unused.contains_key("made_up"));
    }
}

mod test_configuration_dispatch {
    use super::*;
    use transformers_auto::auto;
    use transformers_auto::{Backend, Error, ReferenceBackend, Task};

    #[test]
    fn test_from_config_is_idempotent() {
        let config = tiny(Family::Roberta);
        let a = auto::from_config::<ReferenceBackend>(Task::TokenClassification, &config).unwrap();
        let b = auto::from_config::<ReferenceBackend>(Task::TokenClassification, &config.clone()).unwrap();
        assert_eq!(a.class_name(), "RobertaForTokenClassification");
        assert_eq!(a.class_name(), b.class_name());
        assert_eq!(a.params().as_map(), b.params().as_map());
    }

    #[test]
    fn test_compatible_and_exact_matching_diverge_for_subtypes() {
        let table = ReferenceBackend::registry().table(Task::CausalLm);
        let compatible = table.resolve_by_compatible_type(Family::Camembert).unwrap();
        assert_eq!(compatible.name(), "BertLMHeadModel");

        let exact = table.resolve_by_exact_type(Family::Camembert).unwrap_err();
        let message = exact.to_string();
        assert!(matches!(exact, Error::UnrecognizedConfiguration { .. }));
        assert!(message.contains("CamembertConfig"));
        assert!(message.contains("BertConfig"));

        let model = table.from_config(&tiny(Family::Camembert)).unwrap();
        assert_eq!(model.class_name(), "BertLMHeadModel");
        assert_eq!(model.config().family, Family::Camembert);
    }

    #[test]
    fn test_missing_task_support_is_an_error() {
        let err = auto::from_config::<ReferenceBackend>(Task::SequenceClassification, &tiny(Family::Gpt2)).unwrap_err();
        assert!(matches!(err, Error::UnrecognizedConfiguration { .. }));
    }
}

mod test_heads {
    use super::*;
    use transformers_auto::auto;
    use transformers_auto::{
        Backend, CandleBackend, Labels, LossKind, ModelInput, OutputKind, ReferenceBackend, SummaryType, Task,
    };

    #[test]
    fn test_lm_head_tie_survives_resize_on_both_backends() {
        let config = tiny(Family::Bert);

        let mut reference = auto::from_config::<ReferenceBackend>(Task::MaskedLm, &config).unwrap();
        assert_eq!(reference.output_embeddings().unwrap(), reference.input_embeddings().unwrap());
        reference.resize_token_embeddings(Some(40)).unwrap();
        assert_eq!(reference.output_embeddings().unwrap(), reference.input_embeddings().unwrap());
        assert_eq!(reference.input_embeddings().unwrap().dims(), &[40, 8]);

        let mut candle = auto::from_config::<CandleBackend>(Task::MaskedLm, &config).unwrap();
        let same = |m: &dyn PreTrainedModel<CandleBackend>| {
            CandleBackend::to_vec(m.output_embeddings().unwrap()).unwrap() == CandleBackend::to_vec(m.input_embeddings().unwrap()).unwrap()
        };
        assert!(same(candle.as_ref()));
        candle.resize_token_embeddings(Some(40)).unwrap();
        assert!(same(candle.as_ref()));
        assert!(CandleBackend::same_storage(
            candle.output_embeddings().unwrap(),
            candle.input_embeddings().unwrap()
        ));
    }

    #[test]
    fn test_labels_prepend_exactly_one_loss() {
        let mut config = tiny(Family::XlNet);
        config.mem_len = Some(4);
        config.output_hidden_states = true;
        let model = auto::from_config::<ReferenceBackend>(Task::TokenClassification, &config).unwrap();

        let ids = vec![vec![1, 2, 3], vec![4, 5, 6]];
        let plain = model.forward(&ModelInput::new(ids.clone())).unwrap();
        assert_eq!(
            plain.kinds(),
            vec![OutputKind::Logits, OutputKind::Memory, OutputKind::HiddenStates]
        );

        let scored = model
            .forward(&ModelInput::new(ids).with_labels(Labels::Classes(vec![0, 1, 0, 1, -100, 1])))
            .unwrap();
        assert_eq!(scored.len(), plain.len() + 1);
        assert_eq!(scored.kinds()[0], OutputKind::Loss);
        assert_eq!(&scored.kinds()[1..], plain.kinds().as_slice());
    }

    #[test]
    fn test_label_cardinality_selects_loss() {
        let config = PretrainedConfig::builder(Family::DistilBert)
            .vocab_size(32)
            .hidden_size(8)
            .intermediate_size(16)
            .num_hidden_layers(1)
            .num_attention_heads(2)
            .num_labels(1)
            .build()
            .unwrap();
        let regression = auto::from_config::<CandleBackend>(Task::SequenceClassification, &config).unwrap();
        assert_eq!(regression.loss_kind(), Some(LossKind::MeanSquaredError));
        let out = regression
            .forward(&ModelInput::new(vec![vec![1, 2], vec![3, 4]]).with_labels(Labels::Values(vec![0.25, 0.75])))
            .unwrap();
        assert!(CandleBackend::to_vec(out.loss().unwrap()).unwrap()[0] >= 0.0);

        let config = tiny(Family::DistilBert);
        let classifier = auto::from_config::<CandleBackend>(Task::SequenceClassification, &config).unwrap();
        assert_eq!(classifier.loss_kind(), Some(LossKind::CrossEntropy));
        assert!(classifier
            .forward(&ModelInput::new(vec![vec![1, 2]]).with_labels(Labels::Values(vec![0.5])))
            .is_err());
    }

    #[test]
    fn test_token_types_default_to_zero() {
        let model = auto::from_config::<ReferenceBackend>(Task::TokenClassification, &tiny(Family::Bert)).unwrap();
        let ids = vec![vec![3, 4, 5]];

        let implicit = model.forward(&ModelInput::new(ids.clone())).unwrap();
        let explicit = model
            .forward(&ModelInput::new(ids.clone()).with_token_types(vec![vec![0, 0, 0]]))
            .unwrap();
        assert_eq!(implicit.tensor(OutputKind::Logits), explicit.tensor(OutputKind::Logits));

        let segments = model
            .forward(&ModelInput::new(ids.clone()).with_token_types(vec![vec![0, 1, 1]]))
            .unwrap();
        assert_ne!(implicit.tensor(OutputKind::Logits), segments.tensor(OutputKind::Logits));
        assert!(model
            .forward(&ModelInput::new(ids).with_token_types(vec![vec![0, 0, 9]]))
            .is_err());
    }

    #[test]
    fn test_cls_index_selects_summary_position() {
        let config = PretrainedConfig::builder(Family::XlNet)
            .vocab_size(32)
            .hidden_size(8)
            .intermediate_size(16)
            .num_hidden_layers(1)
            .num_attention_heads(2)
            .summary_type(SummaryType::ClsIndex)
            .build()
            .unwrap();
        let model = auto::from_config::<ReferenceBackend>(Task::SequenceClassification, &config).unwrap();
        let ids = vec![vec![1, 2, 3, 4]];

        let fallback = model.forward(&ModelInput::new(ids.clone())).unwrap();
        let last = model
            .forward(&ModelInput::new(ids.clone()).with_cls_index(vec![3]))
            .unwrap();
        let first = model.forward(&ModelInput::new(ids).with_cls_index(vec![0])).unwrap();
        assert_eq!(fallback.tensor(OutputKind::Logits), last.tensor(OutputKind::Logits));
        assert_ne!(first.tensor(OutputKind::Logits), last.tensor(OutputKind::Logits));
    }

    #[test]
    fn test_transfo_xl_memory_keeps_its_length() {
        let mut config = tiny(Family::TransfoXl);
        config.mem_len = Some(6);
        let model = auto::from_config::<ReferenceBackend>(Task::Base, &config).unwrap();

        let first = model.forward(&ModelInput::new(vec![vec![1, 2, 3, 4]])).unwrap();
        let memory = first.sequence(OutputKind::Memory).unwrap().to_vec();
        assert_eq!(memory.len(), 2);
        let second = model
            .forward(&ModelInput::new(vec![vec![5, 6, 7, 8, 9]]).with_memory(memory))
            .unwrap();
        for layer in second.sequence(OutputKind::Memory).unwrap() {
            assert_eq!(layer.dims(), &[1, 6, 8]);
        }
    }
}

mod test_pretrained_loading {
    use super::*;
    use transformers_auto::auto;
    use transformers_auto::core::Shape;
    use transformers_auto::{Backend, CandleBackend, Error, LoadOptions, LocalStore, ReferenceBackend, Task, Tensor};

    fn saved_base(name: &str) -> (TempDir, PathBuf) {
        let (root, dir) = scratch(name);
        let model = auto::from_config::<ReferenceBackend>(Task::Base, &tiny(Family::Bert)).unwrap();
        model.save_pretrained(&dir).unwrap();
        (root, dir)
    }

    #[test]
    fn test_saved_directory_round_trips() {
        let (_root, dir) = saved_base("bert-tiny");
        let document: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(dir.join("config.json")).unwrap()).unwrap();
        assert_eq!(document["model_type"], "bert");
        assert_eq!(document["architectures"][0], "BertModel");

        let loaded = auto::model_from_identifier_with::<ReferenceBackend>(
            &LocalStore::new(),
            dir.to_str().unwrap(),
            LoadOptions::new().with_loading_info(),
        )
        .unwrap();
        assert!(loaded.loading_info.unwrap().is_clean());
        assert!(!loaded.model.is_training());

        let fresh = auto::from_config::<ReferenceBackend>(Task::Base, &tiny(Family::Bert)).unwrap();
        assert_eq!(loaded.model.params().as_map(), fresh.params().as_map());
    }

    #[test]
    fn test_body_weights_into_head_report_missing_head() {
        let (_root, dir) = saved_base("bert-tiny");
        let loaded = auto::from_pretrained_with::<ReferenceBackend>(
            &LocalStore::new(),
            Task::SequenceClassification,
            dir.to_str().unwrap(),
            LoadOptions::new().with_loading_info().with_override("not_a_field", 7),
        )
        .unwrap();
        assert_eq!(loaded.model.class_name(), "BertForSequenceClassification");
        let info = loaded.loading_info.unwrap();
        assert!(info.unexpected_keys.is_empty());
        assert_eq!(
            info.missing_keys,
            vec![
                "sequence_summary.summary.bias".to_string(),
                "sequence_summary.summary.weight".to_string()
            ]
        );
        assert!(loaded.unused.contains_key("not_a_field"));

        let strict = auto::from_pretrained_with::<ReferenceBackend>(
            &LocalStore::new(),
            Task::SequenceClassification,
            dir.to_str().unwrap(),
            LoadOptions::new().strict(),
        );
        assert!(matches!(strict, Err(Error::StrictLoad { .. })));
    }

    #[test]
    fn test_explicit_state_dict_replaces_weights_file() {
        let (_root, dir) = saved_base("bert-tiny");
        let fresh = auto::from_config::<ReferenceBackend>(Task::Base, &tiny(Family::Bert)).unwrap();
        let mut state = fresh.params().as_map().clone();
        let embeddings = Tensor::filled(Shape::new(vec![32, 8]), 0.5);
        state.insert("embeddings.word_embeddings.weight".to_string(), embeddings.clone());

        let loaded = auto::from_pretrained_with::<ReferenceBackend>(
            &LocalStore::new(),
            Task::Base,
            dir.to_str().unwrap(),
            LoadOptions::new().with_state_dict(state).with_loading_info(),
        )
        .unwrap();
        assert!(loaded.loading_info.unwrap().is_clean());
        assert_eq!(loaded.model.input_embeddings().unwrap(), &embeddings);
    }

    #[test]
    fn test_unknown_document_fields_kept_on_request() {
        let (_root, dir) = saved_base("bert-tiny");
        let path = dir.join("config.json");
        let mut document: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        document["finetuning_task"] = serde_json::json!("sst-2");
        std::fs::write(&path, document.to_string()).unwrap();

        let identifier = dir.to_str().unwrap();
        let dropped =
            auto::from_pretrained_with::<ReferenceBackend>(&LocalStore::new(), Task::Base, identifier, LoadOptions::new())
                .unwrap();
        assert!(dropped.model.config().extra.is_empty());

        let kept = auto::from_pretrained_with::<ReferenceBackend>(
            &LocalStore::new(),
            Task::Base,
            identifier,
            LoadOptions::new().keeping_unknown_fields(),
        )
        .unwrap();
        assert_eq!(kept.model.config().extra["finetuning_task"], "sst-2");
    }

    #[test]
    fn test_loading_info_only_on_request() {
        let (_root, dir) = saved_base("bert-tiny");
        let loaded =
            auto::from_pretrained_with::<ReferenceBackend>(&LocalStore::new(), Task::Base, dir.to_str().unwrap(), LoadOptions::new())
                .unwrap();
        assert!(loaded.loading_info.is_none());
    }

    #[test]
    fn test_weights_file_needs_explicit_configuration() {
        let (_root, dir) = saved_base("bert-tiny");
        let file = dir.join("reference_model.safetensors");
        let identifier = file.to_str().unwrap();

        let err = auto::from_pretrained_with::<ReferenceBackend>(&LocalStore::new(), Task::Base, identifier, LoadOptions::new())
            .unwrap_err();
        assert!(matches!(err, Error::ConfigurationRequired(_)));

        let loaded = auto::from_pretrained_with::<ReferenceBackend>(
            &LocalStore::new(),
            Task::Base,
            identifier,
            LoadOptions::new().with_config(tiny(Family::Bert)),
        )
        .unwrap();
        assert_eq!(loaded.model.class_name(), "BertModel");
    }

    #[test]
    fn test_other_backend_weights_need_the_flag() {
        let (_root, dir) = saved_base("bert-tiny");
        let identifier = dir.to_str().unwrap();

        let err = auto::from_pretrained_with::<CandleBackend>(&LocalStore::new(), Task::Base, identifier, LoadOptions::new())
            .unwrap_err();
        assert!(matches!(err, Error::AlternateWeights { .. }));

        let loaded = auto::from_pretrained_with::<CandleBackend>(
            &LocalStore::new(),
            Task::Base,
            identifier,
            LoadOptions::new().from_alternate().with_loading_info(),
        )
        .unwrap();
        assert!(loaded.loading_info.unwrap().is_clean());

        let reference = auto::from_config::<ReferenceBackend>(Task::Base, &tiny(Family::Bert)).unwrap();
        let expected = reference.input_embeddings().unwrap().data().to_vec();
        let actual = CandleBackend::to_vec(loaded.model.input_embeddings().unwrap()).unwrap();
        assert_eq!(actual, expected);
    }
}
