//! Deterministic hand-built models for tests.
//!
//! The fixture encoder is fitted on a 13-example corpus. Every base estimator
//! keys on the same two token groups (SQL keywords and XSS markup), and the
//! meta-model is fitted on the corpus at construction time, so predictions
//! are stable without any trained artifact on disk.
//!
//! Enabled for this crate's own tests and for dependents through the
//! `testing` feature.

use std::path::Path;

use stackguard_core::{ClassLabel, ModelConfig, Result};

use crate::classifier::Classifier;
use crate::encoder::{TfidfConfig, TfidfEncoder};
use crate::ensemble::StackingEnsemble;
use crate::estimators::{
    BaseEstimator, DecisionTree, DenseLayer, ExtraTrees, Forest, GradientBoosting,
    LogisticRegression, NeuralNetwork, RandomForest, TreeNode, CANONICAL_ORDER,
};
use crate::guardrail::SqliGuardrail;
use crate::meta::{LinearSvm, SvmConfig};

const SQL_TOKENS: [&str; 10] = [
    "union", "select", "or", "drop", "table", "insert", "into", "update", "set", "users",
];

const XSS_TOKENS: [&str; 10] = [
    "script",
    "alert",
    "img",
    "src",
    "onerror",
    "svg",
    "onload",
    "javascript",
    "document",
    "cookie",
];

/// `(sql token, xss token)` split pairs for each forest.
const RF_SPLITS: [(&str, &str); 5] = [
    ("union", "script"),
    ("or", "alert"),
    ("drop", "onerror"),
    ("insert", "svg"),
    ("update", "javascript"),
];
const ET_SPLITS: [(&str, &str); 5] = [
    ("select", "alert"),
    ("table", "img"),
    ("into", "onload"),
    ("set", "document"),
    ("users", "cookie"),
];
const GB_SPLITS: [(&str, &str); 5] = [
    ("select", "alert"),
    ("or", "script"),
    ("drop", "onload"),
    ("insert", "img"),
    ("update", "javascript"),
];

/// Labelled training corpus for the fixture models.
pub fn fixture_corpus() -> Vec<(&'static str, ClassLabel)> {
    vec![
        ("' union select password from users --", ClassLabel::Sqli),
        ("admin' or 1=1 --", ClassLabel::Sqli),
        ("1; drop table users", ClassLabel::Sqli),
        ("insert into accounts values (1, 'x')", ClassLabel::Sqli),
        ("update users set role = 'admin' where id = 1", ClassLabel::Sqli),
        ("<script>alert(1)</script>", ClassLabel::Xss),
        ("<img src=x onerror=alert(document.cookie)>", ClassLabel::Xss),
        ("<svg onload=alert(1)>", ClassLabel::Xss),
        ("javascript:alert(document.domain)", ClassLabel::Xss),
        ("hello world", ClassLabel::Benign),
        ("please reset my password", ClassLabel::Benign),
        ("the weather is nice today", ClassLabel::Benign),
        ("where is the nearest coffee shop", ClassLabel::Benign),
    ]
}

/// Encoder fitted on [`fixture_corpus`] (42 columns).
pub fn fixture_encoder() -> TfidfEncoder {
    let texts: Vec<&str> = fixture_corpus().into_iter().map(|(t, _)| t).collect();
    TfidfEncoder::fit(&texts, &TfidfConfig::default()).expect("fixture corpus is non-empty")
}

fn column(encoder: &TfidfEncoder, term: &str) -> usize {
    encoder
        .column(term)
        .unwrap_or_else(|| panic!("fixture term '{term}' missing from vocabulary"))
}

/// Weight rows scoring the SQL group for class 0 and the XSS group for class 1.
fn keyword_rows(encoder: &TfidfEncoder, weight: f32) -> Vec<Vec<f32>> {
    let mut rows = vec![vec![0.0; encoder.dimension()]; ClassLabel::COUNT];
    for term in SQL_TOKENS {
        rows[0][column(encoder, term)] = weight;
    }
    for term in XSS_TOKENS {
        rows[1][column(encoder, term)] = weight;
    }
    rows
}

/// Two-level tree: SQL token present → mostly SQLi, else XSS token present →
/// mostly XSS, else mostly benign.
fn keyword_tree(encoder: &TfidfEncoder, sql: &str, xss: &str) -> DecisionTree {
    DecisionTree::new(vec![
        TreeNode::Split {
            feature: column(encoder, sql),
            threshold: 0.0,
            left: 1,
            right: 4,
        },
        TreeNode::Split {
            feature: column(encoder, xss),
            threshold: 0.0,
            left: 2,
            right: 3,
        },
        TreeNode::Leaf {
            value: vec![1.0, 1.0, 8.0],
        },
        TreeNode::Leaf {
            value: vec![0.0, 9.0, 1.0],
        },
        TreeNode::Leaf {
            value: vec![9.0, 0.0, 1.0],
        },
    ])
    .expect("fixture tree layout is valid")
}

fn indicator(feature: usize) -> DecisionTree {
    DecisionTree::new(vec![
        TreeNode::Split {
            feature,
            threshold: 0.0,
            left: 1,
            right: 2,
        },
        TreeNode::Leaf { value: vec![-0.5] },
        TreeNode::Leaf { value: vec![3.0] },
    ])
    .expect("fixture indicator layout is valid")
}

fn forest(encoder: &TfidfEncoder, splits: &[(&str, &str)]) -> Forest {
    let trees = splits
        .iter()
        .map(|(sql, xss)| keyword_tree(encoder, sql, xss))
        .collect();
    Forest::new(encoder.dimension(), ClassLabel::COUNT, trees).expect("fixture forest is valid")
}

/// The five keyword-driven base estimators in canonical order.
pub fn fixture_bases(encoder: &TfidfEncoder) -> Vec<BaseEstimator> {
    let dim = encoder.dimension();

    let lr = LogisticRegression::new(keyword_rows(encoder, 6.0), vec![0.0, 0.0, 1.0])
        .expect("fixture logistic regression is valid");

    let nn = NeuralNetwork::new(vec![
        DenseLayer {
            weights: keyword_rows(encoder, 6.0),
            bias: vec![0.0, 0.0, 1.0],
        },
        DenseLayer {
            weights: vec![
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.0, 0.0, 1.0],
            ],
            bias: vec![0.0; 3],
        },
    ])
    .expect("fixture network is valid");

    let stages = GB_SPLITS
        .iter()
        .map(|(sql, xss)| {
            vec![
                indicator(column(encoder, sql)),
                indicator(column(encoder, xss)),
                DecisionTree::leaf(vec![0.0]),
            ]
        })
        .collect();
    let gb = GradientBoosting::new(dim, 0.5, vec![0.0, 0.0, 0.5], stages)
        .expect("fixture boosting model is valid");

    vec![
        lr.into(),
        nn.into(),
        RandomForest(forest(encoder, &RF_SPLITS)).into(),
        ExtraTrees(forest(encoder, &ET_SPLITS)).into(),
        gb.into(),
    ]
}

fn fitted(bases: Vec<BaseEstimator>, encoder: &TfidfEncoder) -> StackingEnsemble {
    let width = ClassLabel::COUNT * bases.len();
    let mut ensemble = StackingEnsemble::new(bases, LinearSvm::new(width, SvmConfig::default()))
        .expect("fixture ensemble is consistent");
    let (texts, labels): (Vec<&str>, Vec<ClassLabel>) = fixture_corpus().into_iter().unzip();
    ensemble
        .fit(&encoder.encode_batch(&texts), &labels)
        .expect("fixture corpus fits");
    ensemble
}

/// Keyword ensemble with the meta-model fitted on [`fixture_corpus`].
pub fn fixture_ensemble() -> StackingEnsemble {
    let encoder = fixture_encoder();
    fitted(fixture_bases(&encoder), &encoder)
}

/// Ensemble in which only the logistic regression block carries signal; the
/// other four bases always return uniform probabilities.
pub fn linear_only_ensemble() -> StackingEnsemble {
    let encoder = fixture_encoder();
    let dim = encoder.dimension();
    let uniform_forest = || {
        Forest::new(dim, ClassLabel::COUNT, vec![DecisionTree::leaf(vec![1.0; 3])])
            .expect("uniform forest is valid")
    };
    let bases: Vec<BaseEstimator> = vec![
        LogisticRegression::new(keyword_rows(&encoder, 6.0), vec![0.0, 0.0, 1.0])
            .expect("fixture logistic regression is valid")
            .into(),
        NeuralNetwork::new(vec![DenseLayer {
            weights: vec![vec![0.0; dim]; 3],
            bias: vec![0.0; 3],
        }])
        .expect("zero network is valid")
        .into(),
        RandomForest(uniform_forest()).into(),
        ExtraTrees(uniform_forest()).into(),
        GradientBoosting::new(dim, 0.1, vec![0.0; 3], Vec::new())
            .expect("prior-only boosting model is valid")
            .into(),
    ];
    fitted(bases, &encoder)
}

/// Ensemble whose meta-model always predicts SQLi.
pub fn always_sqli_ensemble() -> StackingEnsemble {
    let encoder = fixture_encoder();
    let meta = LinearSvm::from_parts(
        vec![vec![0.0; 15]; 3],
        vec![1.0, 0.0, 0.0],
        CANONICAL_ORDER.to_vec(),
        SvmConfig::default(),
    )
    .expect("constant meta-model is valid");
    StackingEnsemble::new(fixture_bases(&encoder), meta).expect("fixture ensemble is consistent")
}

/// [`fixture_encoder`] + [`fixture_ensemble`] + default guardrail.
pub fn fixture_classifier() -> Classifier {
    Classifier::new(
        fixture_encoder(),
        fixture_ensemble(),
        SqliGuardrail::new().expect("default patterns compile"),
    )
    .expect("fixture parts agree")
}

/// [`always_sqli_ensemble`] behind the default guardrail.
pub fn always_sqli_classifier() -> Classifier {
    Classifier::new(
        fixture_encoder(),
        always_sqli_ensemble(),
        SqliGuardrail::new().expect("default patterns compile"),
    )
    .expect("fixture parts agree")
}

/// Write the fixture encoder and ensemble artifacts into `dir` and return a
/// [`ModelConfig`] pointing at them.
pub fn write_fixture_artifacts(dir: &Path) -> Result<ModelConfig> {
    let encoder_path = dir.join("encoder.json");
    let ensemble_path = dir.join("ensemble.json");
    fixture_encoder().save(&encoder_path)?;
    fixture_ensemble().save(&ensemble_path)?;
    Ok(ModelConfig {
        encoder_path: encoder_path.display().to_string(),
        ensemble_path: ensemble_path.display().to_string(),
    })
}
