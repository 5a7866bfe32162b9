// Sentiment classification: ordinal star model collapsed to three classes.
//
// The SentimentClassifier trait defines the interface; OnnxSentimentClassifier
// runs the multilingual star-rating model locally.

pub mod onnx;
pub mod traits;
