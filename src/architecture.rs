//! Layer specification lists and their desugaring.
//!
//! A network is described by an ordered list of [`LayerSpec`] records, either
//! built in code or loaded from a JSON file. Before instantiation the list
//! goes through a desugaring pass that expands the conveniences users expect:
//! classifier heads grow their own fully connected layer, `activation` fields
//! become activation layers, and `drop_prob` fields become dropout layers.

use std::error::Error;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Configuration for a single layer in the pipeline.
///
/// Different layer types read different fields; everything except
/// `layer_type` is optional and ignored by types that don't use it:
///
/// - **input**: `out_sx`, `out_sy`, `out_depth`
/// - **fc**: `num_neurons`, optional `bias_pref`, `l1_decay_mul`,
///   `l2_decay_mul`, `activation`, `drop_prob`
/// - **conv**: `sx` (filter size, `sy` defaults to `sx`), `filters`,
///   optional `stride` (default 1), `pad` (default 0), `bias_pref`,
///   decay multipliers, `activation`, `drop_prob`
/// - **pool**: `sx` (`sy` defaults to `sx`), optional `stride` (default 2),
///   `pad` (default 0)
/// - **relu/sigmoid/tanh**: no parameters; **elu**: optional `alpha`
///   (default 1.0)
/// - **dropout**: `drop_prob`
/// - **softmax/svm**: `num_classes`; **regression**: `num_neurons`
///
/// # Example
///
/// ```json
/// {
///   "layers": [
///     { "layer_type": "input", "out_sx": 24, "out_sy": 24, "out_depth": 1 },
///     { "layer_type": "conv", "sx": 5, "filters": 8, "stride": 1,
///       "activation": "relu" },
///     { "layer_type": "pool", "sx": 2, "stride": 2 },
///     { "layer_type": "softmax", "num_classes": 10 }
///   ]
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LayerSpec {
    /// Type tag: "input", "fc", "conv", "pool", "relu", "sigmoid", "tanh",
    /// "elu", "dropout", "softmax", "svm" or "regression".
    pub layer_type: String,

    // input layer shape
    pub out_sx: Option<usize>,
    pub out_sy: Option<usize>,
    pub out_depth: Option<usize>,

    /// Neuron count for fc/regression layers.
    pub num_neurons: Option<usize>,
    /// Class count for softmax/svm heads.
    pub num_classes: Option<usize>,

    /// Filter width for conv/pool layers.
    pub sx: Option<usize>,
    /// Filter height; defaults to `sx`.
    pub sy: Option<usize>,
    /// Feature map count for conv layers.
    pub filters: Option<usize>,
    /// Sweep stride (conv default 1, pool default 2).
    pub stride: Option<usize>,
    /// Zero padding around the input borders (default 0).
    pub pad: Option<usize>,

    /// Initial bias value for fc/conv layers.
    pub bias_pref: Option<f32>,
    pub l1_decay_mul: Option<f32>,
    pub l2_decay_mul: Option<f32>,

    /// Appends a matching activation layer after this one.
    pub activation: Option<String>,
    /// Appends a dropout layer after this one (or configures a dropout
    /// layer's own probability).
    pub drop_prob: Option<f32>,
    /// ELU saturation constant (default 1.0).
    pub alpha: Option<f32>,
}

impl LayerSpec {
    /// Shorthand for a bare spec of the given type.
    pub fn of_type(layer_type: &str) -> Self {
        Self {
            layer_type: layer_type.to_string(),
            ..Default::default()
        }
    }
}

/// A whole-network specification, as stored in JSON config files.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetSpec {
    pub layers: Vec<LayerSpec>,
}

/// Loads a network specification from a JSON file.
pub fn load_spec(path: impl AsRef<Path>) -> Result<NetSpec, Box<dyn Error>> {
    let contents = fs::read_to_string(path)?;
    let spec: NetSpec = serde_json::from_str(&contents)?;
    Ok(spec)
}

/// Expand a user-written spec list into the fully materialized sequence.
///
/// - softmax/svm heads are preceded by an implicit fc layer sized to
///   `num_classes` (regression: `num_neurons`);
/// - fc/conv specs without an explicit `bias_pref` get 0.0, or 0.1 when
///   their activation is relu (a dead relu never recovers, a little
///   positive bias gets gradients flowing early);
/// - an `activation` field appends the matching activation layer
///   (unsupported names are reported and skipped, not fatal);
/// - a `drop_prob` field on a non-dropout spec appends a dropout layer.
pub fn desugar(specs: &[LayerSpec]) -> Vec<LayerSpec> {
    let mut out = Vec::with_capacity(specs.len());
    for spec in specs {
        let mut spec = spec.clone();

        if spec.layer_type == "softmax" || spec.layer_type == "svm" {
            let mut fc = LayerSpec::of_type("fc");
            fc.num_neurons = spec.num_classes;
            out.push(fc);
        }
        if spec.layer_type == "regression" {
            let mut fc = LayerSpec::of_type("fc");
            fc.num_neurons = spec.num_neurons;
            out.push(fc);
        }

        if (spec.layer_type == "fc" || spec.layer_type == "conv") && spec.bias_pref.is_none() {
            spec.bias_pref = Some(0.0);
            if spec.activation.as_deref() == Some("relu") {
                spec.bias_pref = Some(0.1);
            }
        }

        let activation = spec.activation.clone();
        let drop_prob = spec.drop_prob;
        let is_dropout = spec.layer_type == "dropout";
        out.push(spec);

        if let Some(act) = activation {
            match act.as_str() {
                "relu" | "sigmoid" | "tanh" | "elu" => out.push(LayerSpec::of_type(&act)),
                other => eprintln!("unsupported activation '{}', skipping", other),
            }
        }
        if let Some(p) = drop_prob {
            if !is_dropout {
                let mut dropout = LayerSpec::of_type("dropout");
                dropout.drop_prob = Some(p);
                out.push(dropout);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(specs: &[LayerSpec]) -> Vec<&str> {
        specs.iter().map(|s| s.layer_type.as_str()).collect()
    }

    #[test]
    fn test_softmax_gains_fc() {
        let mut softmax = LayerSpec::of_type("softmax");
        softmax.num_classes = Some(10);
        let specs = vec![LayerSpec::of_type("input"), softmax];

        let out = desugar(&specs);
        assert_eq!(types(&out), vec!["input", "fc", "softmax"]);
        assert_eq!(out[1].num_neurons, Some(10));
    }

    #[test]
    fn test_regression_gains_fc() {
        let mut reg = LayerSpec::of_type("regression");
        reg.num_neurons = Some(3);
        let out = desugar(&[LayerSpec::of_type("input"), reg]);
        assert_eq!(types(&out), vec!["input", "fc", "regression"]);
        assert_eq!(out[1].num_neurons, Some(3));
    }

    #[test]
    fn test_activation_field_appends_layer() {
        let mut fc = LayerSpec::of_type("fc");
        fc.num_neurons = Some(4);
        fc.activation = Some("tanh".to_string());

        let out = desugar(&[fc]);
        assert_eq!(types(&out), vec!["fc", "tanh"]);
    }

    #[test]
    fn test_relu_activation_sets_bias_pref() {
        let mut fc = LayerSpec::of_type("fc");
        fc.num_neurons = Some(4);
        fc.activation = Some("relu".to_string());

        let out = desugar(&[fc]);
        assert_eq!(out[0].bias_pref, Some(0.1));
    }

    #[test]
    fn test_explicit_bias_pref_kept() {
        let mut fc = LayerSpec::of_type("fc");
        fc.num_neurons = Some(4);
        fc.activation = Some("relu".to_string());
        fc.bias_pref = Some(0.5);

        let out = desugar(&[fc]);
        assert_eq!(out[0].bias_pref, Some(0.5));
    }

    #[test]
    fn test_unsupported_activation_is_skipped() {
        let mut fc = LayerSpec::of_type("fc");
        fc.num_neurons = Some(4);
        fc.activation = Some("maxout".to_string());

        let out = desugar(&[fc]);
        assert_eq!(types(&out), vec!["fc"]);
    }

    #[test]
    fn test_drop_prob_appends_dropout() {
        let mut fc = LayerSpec::of_type("fc");
        fc.num_neurons = Some(4);
        fc.drop_prob = Some(0.5);

        let out = desugar(&[fc]);
        assert_eq!(types(&out), vec!["fc", "dropout"]);
        assert_eq!(out[1].drop_prob, Some(0.5));
    }

    #[test]
    fn test_dropout_spec_not_doubled() {
        let mut dropout = LayerSpec::of_type("dropout");
        dropout.drop_prob = Some(0.3);
        let out = desugar(&[dropout]);
        assert_eq!(types(&out), vec!["dropout"]);
    }

    #[test]
    fn test_activation_then_dropout_ordering() {
        let mut conv = LayerSpec::of_type("conv");
        conv.sx = Some(3);
        conv.filters = Some(8);
        conv.activation = Some("relu".to_string());
        conv.drop_prob = Some(0.2);

        let out = desugar(&[conv]);
        assert_eq!(types(&out), vec!["conv", "relu", "dropout"]);
    }
}
