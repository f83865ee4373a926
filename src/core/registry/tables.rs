//! Per-task lists of (family, class) pairs.
//!
//! Subtypes are listed before their supertypes so that compatible-type resolution
//! picks the nearest registered ancestor.

use super::{MatchDiscipline, Task};
use crate::core::family::Family;
use crate::core::model::Head;

use crate::core::family::Family::*;
use crate::core::model::Head::*;

#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub task: Task,
    pub discipline: MatchDiscipline,
    pub entries: &'static [(Family, Head, &'static str)],
}

const BASE: &[(Family, Head, &str)] = &[
    (T5, Base, "T5Model"),
    (DistilBert, Base, "DistilBertModel"),
    (Albert, Base, "AlbertModel"),
    (Camembert, Base, "CamembertModel"),
    (XlmRoberta, Base, "XLMRobertaModel"),
    (Roberta, Base, "RobertaModel"),
    (Bert, Base, "BertModel"),
    (OpenAiGpt, Base, "OpenAIGPTModel"),
    (Gpt2, Base, "GPT2Model"),
    (MobileBert, Base, "MobileBertModel"),
    (TransfoXl, Base, "TransfoXLModel"),
    (XlNet, Base, "XLNetModel"),
    (Flaubert, Base, "FlaubertModel"),
    (Xlm, Base, "XLMModel"),
    (Ctrl, Base, "CTRLModel"),
    (Electra, Base, "ElectraModel"),
];

const PRETRAINING: &[(Family, Head, &str)] = &[
    (T5, Seq2SeqLm, "T5ForConditionalGeneration"),
    (DistilBert, MaskedLm, "DistilBertForMaskedLM"),
    (Albert, MaskedLm, "AlbertForPreTraining"),
    (Camembert, MaskedLm, "CamembertForMaskedLM"),
    (XlmRoberta, MaskedLm, "XLMRobertaForMaskedLM"),
    (Roberta, MaskedLm, "RobertaForMaskedLM"),
    (Bert, MaskedLm, "BertForPreTraining"),
    (OpenAiGpt, CausalLm, "OpenAIGPTLMHeadModel"),
    (Gpt2, CausalLm, "GPT2LMHeadModel"),
    (MobileBert, MaskedLm, "MobileBertForPreTraining"),
    (TransfoXl, CausalLm, "TransfoXLLMHeadModel"),
    (XlNet, CausalLm, "XLNetLMHeadModel"),
    (Flaubert, MaskedLm, "FlaubertWithLMHeadModel"),
    (Xlm, MaskedLm, "XLMWithLMHeadModel"),
    (Ctrl, CausalLm, "CTRLLMHeadModel"),
    (Electra, MaskedLm, "ElectraForPreTraining"),
];

const WITH_LM_HEAD: &[(Family, Head, &str)] = &[
    (T5, Seq2SeqLm, "T5ForConditionalGeneration"),
    (DistilBert, MaskedLm, "DistilBertForMaskedLM"),
    (Albert, MaskedLm, "AlbertForMaskedLM"),
    (Camembert, MaskedLm, "CamembertForMaskedLM"),
    (XlmRoberta, MaskedLm, "XLMRobertaForMaskedLM"),
    (Roberta, MaskedLm, "RobertaForMaskedLM"),
    (Bert, MaskedLm, "BertForMaskedLM"),
    (OpenAiGpt, CausalLm, "OpenAIGPTLMHeadModel"),
    (Gpt2, CausalLm, "GPT2LMHeadModel"),
    (MobileBert, MaskedLm, "MobileBertForMaskedLM"),
    (TransfoXl, CausalLm, "TransfoXLLMHeadModel"),
    (XlNet, CausalLm, "XLNetLMHeadModel"),
    (Flaubert, MaskedLm, "FlaubertWithLMHeadModel"),
    (Xlm, MaskedLm, "XLMWithLMHeadModel"),
    (Ctrl, CausalLm, "CTRLLMHeadModel"),
    (Electra, MaskedLm, "ElectraForMaskedLM"),
];

const CAUSAL_LM: &[(Family, Head, &str)] = &[
    (Bert, CausalLm, "BertLMHeadModel"),
    (OpenAiGpt, CausalLm, "OpenAIGPTLMHeadModel"),
    (Gpt2, CausalLm, "GPT2LMHeadModel"),
    (TransfoXl, CausalLm, "TransfoXLLMHeadModel"),
    (XlNet, CausalLm, "XLNetLMHeadModel"),
    (Xlm, MaskedLm, "XLMWithLMHeadModel"),
    (Ctrl, CausalLm, "CTRLLMHeadModel"),
];

const MASKED_LM: &[(Family, Head, &str)] = &[
    (DistilBert, MaskedLm, "DistilBertForMaskedLM"),
    (Albert, MaskedLm, "AlbertForMaskedLM"),
    (Camembert, MaskedLm, "CamembertForMaskedLM"),
    (XlmRoberta, MaskedLm, "XLMRobertaForMaskedLM"),
    (Roberta, MaskedLm, "RobertaForMaskedLM"),
    (Bert, MaskedLm, "BertForMaskedLM"),
    (MobileBert, MaskedLm, "MobileBertForMaskedLM"),
    (Flaubert, MaskedLm, "FlaubertWithLMHeadModel"),
    (Xlm, MaskedLm, "XLMWithLMHeadModel"),
    (Electra, MaskedLm, "ElectraForMaskedLM"),
];

const SEQ_TO_SEQ_LM: &[(Family, Head, &str)] = &[(T5, Seq2SeqLm, "T5ForConditionalGeneration")];

const SEQUENCE_CLASSIFICATION: &[(Family, Head, &str)] = &[
    (DistilBert, SequenceClassification, "DistilBertForSequenceClassification"),
    (Albert, SequenceClassification, "AlbertForSequenceClassification"),
    (Camembert, SequenceClassification, "CamembertForSequenceClassification"),
    (XlmRoberta, SequenceClassification, "XLMRobertaForSequenceClassification"),
    (Roberta, SequenceClassification, "RobertaForSequenceClassification"),
    (Bert, SequenceClassification, "BertForSequenceClassification"),
    (XlNet, SequenceClassification, "XLNetForSequenceClassification"),
    (MobileBert, SequenceClassification, "MobileBertForSequenceClassification"),
    (Flaubert, SequenceClassification, "FlaubertForSequenceClassification"),
    (Xlm, SequenceClassification, "XLMForSequenceClassification"),
    (Electra, SequenceClassification, "ElectraForSequenceClassification"),
];

const QUESTION_ANSWERING: &[(Family, Head, &str)] = &[
    (DistilBert, QuestionAnswering, "DistilBertForQuestionAnswering"),
    (Albert, QuestionAnswering, "AlbertForQuestionAnswering"),
    (Camembert, QuestionAnswering, "CamembertForQuestionAnswering"),
    (XlmRoberta, QuestionAnswering, "XLMRobertaForQuestionAnswering"),
    (Roberta, QuestionAnswering, "RobertaForQuestionAnswering"),
    (Bert, QuestionAnswering, "BertForQuestionAnswering"),
    (XlNet, QuestionAnswering, "XLNetForQuestionAnsweringSimple"),
    (MobileBert, QuestionAnswering, "MobileBertForQuestionAnswering"),
    (Flaubert, QuestionAnswering, "FlaubertForQuestionAnsweringSimple"),
    (Xlm, QuestionAnswering, "XLMForQuestionAnsweringSimple"),
    (Electra, QuestionAnswering, "ElectraForQuestionAnswering"),
];

const TOKEN_CLASSIFICATION: &[(Family, Head, &str)] = &[
    (DistilBert, TokenClassification, "DistilBertForTokenClassification"),
    (Albert, TokenClassification, "AlbertForTokenClassification"),
    (Camembert, TokenClassification, "CamembertForTokenClassification"),
    (Flaubert, TokenClassification, "FlaubertForTokenClassification"),
    (Xlm, TokenClassification, "XLMForTokenClassification"),
    (XlmRoberta, TokenClassification, "XLMRobertaForTokenClassification"),
    (Roberta, TokenClassification, "RobertaForTokenClassification"),
    (Bert, TokenClassification, "BertForTokenClassification"),
    (MobileBert, TokenClassification, "MobileBertForTokenClassification"),
    (XlNet, TokenClassification, "XLNetForTokenClassification"),
    (Electra, TokenClassification, "ElectraForTokenClassification"),
];

const MULTIPLE_CHOICE: &[(Family, Head, &str)] = &[
    (Camembert, MultipleChoice, "CamembertForMultipleChoice"),
    (Flaubert, MultipleChoice, "FlaubertForMultipleChoice"),
    (Xlm, MultipleChoice, "XLMForMultipleChoice"),
    (XlmRoberta, MultipleChoice, "XLMRobertaForMultipleChoice"),
    (Roberta, MultipleChoice, "RobertaForMultipleChoice"),
    (Bert, MultipleChoice, "BertForMultipleChoice"),
    (DistilBert, MultipleChoice, "DistilBertForMultipleChoice"),
    (MobileBert, MultipleChoice, "MobileBertForMultipleChoice"),
    (XlNet, MultipleChoice, "XLNetForMultipleChoice"),
    (Albert, MultipleChoice, "AlbertForMultipleChoice"),
    (Electra, MultipleChoice, "ElectraForMultipleChoice"),
];

pub const TABLE_SPECS: &[TableSpec] = &[
    TableSpec {
        task: Task::Base,
        discipline: MatchDiscipline::Compatible,
        entries: BASE,
    },
    TableSpec {
        task: Task::PreTraining,
        discipline: MatchDiscipline::Compatible,
        entries: PRETRAINING,
    },
    TableSpec {
        task: Task::WithLmHead,
        discipline: MatchDiscipline::Exact,
        entries: WITH_LM_HEAD,
    },
    TableSpec {
        task: Task::CausalLm,
        discipline: MatchDiscipline::Compatible,
        entries: CAUSAL_LM,
    },
    TableSpec {
        task: Task::MaskedLm,
        discipline: MatchDiscipline::Compatible,
        entries: MASKED_LM,
    },
    TableSpec {
        task: Task::Seq2SeqLm,
        discipline: MatchDiscipline::Compatible,
        entries: SEQ_TO_SEQ_LM,
    },
    TableSpec {
        task: Task::SequenceClassification,
        discipline: MatchDiscipline::Compatible,
        entries: SEQUENCE_CLASSIFICATION,
    },
    TableSpec {
        task: Task::QuestionAnswering,
        discipline: MatchDiscipline::Compatible,
        entries: QUESTION_ANSWERING,
    },
    TableSpec {
        task: Task::TokenClassification,
        discipline: MatchDiscipline::Compatible,
        entries: TOKEN_CLASSIFICATION,
    },
    TableSpec {
        task: Task::MultipleChoice,
        discipline: MatchDiscipline::Compatible,
        entries: MULTIPLE_CHOICE,
    },
];
