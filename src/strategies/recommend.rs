use crate::data::types::BucketQuote;
use crate::estimator::ConfidenceScore;
use crate::strategies::types::Recommendation;

pub const DEFAULT_FALLBACK_THRESHOLD: f64 = 50.0;

/// Pick the bucket the market prices highest and check the model against it.
///
/// Ties go to the first bucket seen. `edge` requires the score to be strictly
/// above the price. With no usable quotes, the score is compared against
/// `fallback_threshold` instead.
pub fn recommend(score: f64, quotes: &[BucketQuote], fallback_threshold: f64) -> Recommendation {
    let mut best: Option<&BucketQuote> = None;
    for quote in quotes.iter().filter(|q| q.price.is_finite()) {
        match best {
            Some(current) if quote.price <= current.price => {}
            _ => best = Some(quote),
        }
    }

    match best {
        Some(quote) => Recommendation {
            bucket: Some(quote.bucket.clone()),
            market_price: Some(quote.price),
            edge: score > quote.price,
        },
        None => Recommendation {
            bucket: None,
            market_price: None,
            edge: score > fallback_threshold,
        },
    }
}

/// `recommend` for a tagged score: an unreliable estimate never claims an edge.
pub fn recommend_for(
    score: &ConfidenceScore,
    quotes: &[BucketQuote],
    fallback_threshold: f64,
) -> Recommendation {
    let mut recommendation = recommend(score.value(), quotes, fallback_threshold);
    if !score.is_reliable() {
        recommendation.edge = false;
    }
    recommendation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::types::Side;

    fn quotes(pairs: &[(&str, f64)]) -> Vec<BucketQuote> {
        pairs.iter().map(|(b, p)| BucketQuote::new(*b, *p)).collect()
    }

    #[test]
    fn test_first_max_wins_with_edge() {
        let q = quotes(&[("74-75", 30.0), ("76-77", 55.0), ("78+", 55.0)]);
        let rec = recommend(60.0, &q, DEFAULT_FALLBACK_THRESHOLD);
        assert_eq!(rec.bucket.as_deref(), Some("76-77"));
        assert_eq!(rec.market_price, Some(55.0));
        assert!(rec.edge);
        assert_eq!(rec.side(), Side::Yes);
    }

    #[test]
    fn test_no_edge_when_market_higher() {
        let rec = recommend(60.0, &quotes(&[("A", 70.0)]), DEFAULT_FALLBACK_THRESHOLD);
        assert_eq!(rec.bucket.as_deref(), Some("A"));
        assert!(!rec.edge);
        assert_eq!(rec.side(), Side::No);
    }

    #[test]
    fn test_equal_is_not_edge() {
        let rec = recommend(55.0, &quotes(&[("A", 55.0)]), DEFAULT_FALLBACK_THRESHOLD);
        assert!(!rec.edge);
    }

    #[test]
    fn test_fallback_threshold_without_quotes() {
        let below = recommend(45.0, &[], DEFAULT_FALLBACK_THRESHOLD);
        assert_eq!(below.bucket, None);
        assert!(!below.edge);

        let at = recommend(50.0, &[], DEFAULT_FALLBACK_THRESHOLD);
        assert!(!at.edge);

        let above = recommend(62.0, &[], DEFAULT_FALLBACK_THRESHOLD);
        assert!(above.edge);
    }

    #[test]
    fn test_skips_non_finite_prices() {
        let q = quotes(&[("A", f64::NAN), ("B", 20.0)]);
        let rec = recommend(60.0, &q, DEFAULT_FALLBACK_THRESHOLD);
        assert_eq!(rec.bucket.as_deref(), Some("B"));

        let only_nan = quotes(&[("A", f64::NAN)]);
        assert_eq!(recommend(60.0, &only_nan, DEFAULT_FALLBACK_THRESHOLD).bucket, None);
    }

    #[test]
    fn test_unreliable_never_has_edge() {
        let rec = recommend_for(&ConfidenceScore::Unreliable, &quotes(&[("A", 20.0)]), 10.0);
        assert_eq!(rec.bucket.as_deref(), Some("A"));
        assert!(!rec.edge);

        let rec = recommend_for(&ConfidenceScore::Unreliable, &[], 10.0);
        assert!(!rec.edge);
    }
}
