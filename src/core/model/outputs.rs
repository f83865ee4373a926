use crate::error::{Error, Result};

/// Ground truth handed to a head's forward call.
#[derive(Debug, Clone, PartialEq)]
pub enum Labels {
    /// Class indices. Token-level heads take one per token, flattened row-major.
    Classes(Vec<i64>),
    /// Regression targets, one per sequence.
    Values(Vec<f32>),
    /// Answer span boundaries, one pair per sequence.
    Spans { start: Vec<i64>, end: Vec<i64> },
}

impl Labels {
    pub fn kind(&self) -> &'static str {
        match self {
            Labels::Classes(_) => "class indices",
            Labels::Values(_) => "regression values",
            Labels::Spans { .. } => "answer spans",
        }
    }

    pub fn classes(&self, expected: usize) -> Result<&[i64]> {
        match self {
            Labels::Classes(v) if v.len() == expected => Ok(v),
            Labels::Classes(v) => Err(Error::LabelMismatch(format!("expected {} class labels, got {}", expected, v.len()))),
            other => Err(Error::LabelMismatch(format!("expected class indices, got {}", other.kind()))),
        }
    }

    pub fn values(&self, expected: usize) -> Result<&[f32]> {
        match self {
            Labels::Values(v) if v.len() == expected => Ok(v),
            Labels::Values(v) => Err(Error::LabelMismatch(format!("expected {} regression values, got {}", expected, v.len()))),
            other => Err(Error::LabelMismatch(format!("expected regression values, got {}", other.kind()))),
        }
    }

    pub fn spans(&self, expected: usize) -> Result<(&[i64], &[i64])> {
        match self {
            Labels::Spans { start, end } if start.len() == expected && end.len() == expected => Ok((start, end)),
            Labels::Spans { start, end } => Err(Error::LabelMismatch(format!(
                "expected {} answer spans, got {} starts and {} ends",
                expected,
                start.len(),
                end.len()
            ))),
            other => Err(Error::LabelMismatch(format!("expected answer spans, got {}", other.kind()))),
        }
    }
}

/// Arguments of the uniform forward contract.
#[derive(Debug, Clone)]
pub struct ModelInput<T> {
    /// Token ids, one row per sequence. Multiple-choice input is stored flattened.
    pub input_ids: Vec<Vec<u32>>,
    pub num_choices: Option<usize>,
    pub token_type_ids: Option<Vec<Vec<u32>>>,
    /// Per-layer state returned by a previous call.
    pub memory: Option<Vec<T>>,
    pub cls_index: Option<Vec<usize>>,
    pub labels: Option<Labels>,
}

impl<T> ModelInput<T> {
    pub fn new(input_ids: Vec<Vec<u32>>) -> Self {
        Self {
            input_ids,
            num_choices: None,
            token_type_ids: None,
            memory: None,
            cls_index: None,
            labels: None,
        }
    }

    /// `[batch, choices, seq]` ids for multiple-choice heads.
    pub fn choices(input_ids: Vec<Vec<Vec<u32>>>) -> Result<Self> {
        let num_choices = input_ids.first().map(Vec::len).unwrap_or(0);
        if num_choices == 0 || input_ids.iter().any(|c| c.len() != num_choices) {
            return Err(Error::ShapeMismatch("every example needs the same non-zero number of choices".to_string()));
        }
        let mut input = Self::new(input_ids.into_iter().flatten().collect());
        input.num_choices = Some(num_choices);
        Ok(input)
    }

    pub fn with_token_types(mut self, token_type_ids: Vec<Vec<u32>>) -> Self {
        self.token_type_ids = Some(token_type_ids);
        self
    }

    pub fn with_memory(mut self, memory: Vec<T>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_cls_index(mut self, cls_index: Vec<usize>) -> Self {
        self.cls_index = Some(cls_index);
        self
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn batch_size(&self) -> usize {
        match self.num_choices {
            Some(c) if c > 0 => self.input_ids.len() / c,
            _ => self.input_ids.len(),
        }
    }

    pub fn seq_len(&self) -> usize {
        self.input_ids.first().map(Vec::len).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Loss,
    Logits,
    StartLogits,
    EndLogits,
    LastHiddenState,
    Memory,
    HiddenStates,
}

#[derive(Debug, Clone)]
pub enum OutputValue<T> {
    Single(T),
    Sequence(Vec<T>),
}

/// Ordered forward results: the loss first when labels were given, then the task
/// outputs, then whatever auxiliary state the body produced.
#[derive(Debug, Clone)]
pub struct ModelOutputs<T> {
    items: Vec<(OutputKind, OutputValue<T>)>,
}

impl<T> ModelOutputs<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn push(&mut self, kind: OutputKind, value: OutputValue<T>) {
        self.items.push((kind, value));
    }

    pub fn push_tensor(&mut self, kind: OutputKind, tensor: T) {
        self.push(kind, OutputValue::Single(tensor));
    }

    pub fn prepend_loss(&mut self, loss: T) {
        self.items.insert(0, (OutputKind::Loss, OutputValue::Single(loss)));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn kinds(&self) -> Vec<OutputKind> {
        self.items.iter().map(|(k, _)| *k).collect()
    }

    pub fn get(&self, kind: OutputKind) -> Option<&OutputValue<T>> {
        self.items.iter().find(|(k, _)| *k == kind).map(|(_, v)| v)
    }

    pub fn tensor(&self, kind: OutputKind) -> Option<&T> {
        match self.get(kind)? {
            OutputValue::Single(t) => Some(t),
            OutputValue::Sequence(_) => None,
        }
    }

    pub fn sequence(&self, kind: OutputKind) -> Option<&[T]> {
        match self.get(kind)? {
            OutputValue::Sequence(ts) => Some(ts),
            OutputValue::Single(_) => None,
        }
    }

    pub fn loss(&self) -> Option<&T> {
        self.tensor(OutputKind::Loss)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(OutputKind, OutputValue<T>)> {
        self.items.iter()
    }
}

impl<T> Default for ModelOutputs<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loss_goes_first() {
        let mut out: ModelOutputs<f32> = ModelOutputs::new();
        out.push_tensor(OutputKind::Logits, 1.0);
        out.push(OutputKind::Memory, OutputValue::Sequence(vec![2.0, 3.0]));
        out.prepend_loss(0.5);
        assert_eq!(out.kinds(), vec![OutputKind::Loss, OutputKind::Logits, OutputKind::Memory]);
        assert_eq!(out.loss(), Some(&0.5));
        assert_eq!(out.sequence(OutputKind::Memory).map(|m| m.len()), Some(2));
    }

    #[test]
    fn test_label_kind_mismatch_is_loud() {
        let labels = Labels::Values(vec![0.5]);
        assert!(matches!(labels.classes(1), Err(Error::LabelMismatch(_))));
        assert!(labels.values(1).is_ok());
        assert!(matches!(labels.values(2), Err(Error::LabelMismatch(_))));
    }

    #[test]
    fn test_choices_flatten() {
        let input: ModelInput<f32> = ModelInput::choices(vec![vec![vec![1, 2], vec![3, 4]]]).unwrap();
        assert_eq!(input.input_ids.len(), 2);
        assert_eq!(input.batch_size(), 1);
        assert!(ModelInput::<f32>::choices(vec![vec![vec![1]], vec![]]).is_err());
    }
}
