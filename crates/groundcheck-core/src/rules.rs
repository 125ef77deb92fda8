//! Business rule model for checkout pricing.
//!
//! A [`RuleBook`] is an ordered list of `(matcher, directive)` pairs,
//! evaluated first-match-wins against a test case description. Matching
//! is deliberately keyword-driven (case-insensitive substrings), not
//! semantic. When nothing matches, the book returns its fallback
//! directive: capture prices before and after, assert nothing.
//!
//! # Default checkout rules
//!
//! | # | Rule | Keywords | Cart | Expected price |
//! |---|------|----------|------|----------------|
//! | 1 | `empty-cart` | `empty` | no items | `price_before` |
//! | 2 | `invalid-code` | `invalid` | add items | `price_before` |
//! | 3 | `free-shipping` | `FREESHIP` | add items, express shipping | `price_before - shipping_cost` |
//! | 4 | `percent-discount` | `SAVE15`, `discount` | add items | `price_before * discount_factor` |
//! | – | `capture-only` | (fallback) | add items | no assertion |
//!
//! `free-shipping` sits ahead of the generic `discount` keyword so that a
//! description like "FREESHIP discount code" selects the shipping rule.

use serde::Serialize;

/// Predicate over a test case description.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "keywords", rename_all = "snake_case")]
pub enum Matcher {
    /// True when the description contains any keyword, ignoring case.
    ContainsAny(Vec<String>),
}

impl Matcher {
    pub fn contains_any<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Matcher::ContainsAny(keywords.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, description: &str) -> bool {
        match self {
            Matcher::ContainsAny(keywords) => {
                let haystack = description.to_lowercase();
                keywords
                    .iter()
                    .any(|k| !k.is_empty() && haystack.contains(&k.to_lowercase()))
            }
        }
    }
}

/// Expected relationship between the captured before/after prices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expectation {
    /// `expected = price_before`
    Unchanged,
    /// `expected = price_before * factor`
    Scaled { factor: f64 },
    /// `expected = price_before - amount`
    Reduced { amount: f64 },
    /// Capture both prices; assert nothing.
    CaptureOnly,
}

impl Expectation {
    pub fn expected_price(&self, price_before: f64) -> Option<f64> {
        match self {
            Expectation::Unchanged => Some(price_before),
            Expectation::Scaled { factor } => Some(price_before * factor),
            Expectation::Reduced { amount } => Some(price_before - amount),
            Expectation::CaptureOnly => None,
        }
    }

    /// Right-hand side of `expected = ...`, in terms of `price_before`.
    pub fn formula(&self) -> Option<String> {
        match self {
            Expectation::Unchanged => Some("price_before".to_string()),
            Expectation::Scaled { factor } => Some(format!("price_before * {}", factor)),
            Expectation::Reduced { amount } => Some(format!("price_before - {}", amount)),
            Expectation::CaptureOnly => None,
        }
    }
}

/// How the cart must be prepared before capturing `price_before`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CartSetup {
    pub add_items: bool,
    pub express_shipping: bool,
}

/// Which coupon code the script enters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "code", rename_all = "snake_case")]
pub enum Coupon {
    Fixed(String),
    /// Use whatever code the test case itself names.
    FromTestCase,
}

/// Everything the script synthesizer needs to encode one rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Directive {
    pub rule: String,
    pub cart: CartSetup,
    pub coupon: Coupon,
    pub expectation: Expectation,
    /// Maximum allowed `|after - expected|`.
    pub tolerance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule {
    pub matcher: Matcher,
    pub directive: Directive,
}

/// Numeric constants of the checkout pricing rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingSettings {
    pub discount_factor: f64,
    pub shipping_cost: f64,
    pub tolerance: f64,
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            discount_factor: 0.85,
            shipping_cost: 10.0,
            tolerance: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleBook {
    rules: Vec<Rule>,
    fallback: Directive,
}

impl RuleBook {
    pub fn new(rules: Vec<Rule>, fallback: Directive) -> Self {
        Self { rules, fallback }
    }

    /// The checkout rule set described in the module docs.
    pub fn checkout(settings: PricingSettings) -> Self {
        let with_items = CartSetup {
            add_items: true,
            express_shipping: false,
        };
        let directive = |rule: &str, cart, coupon, expectation| Directive {
            rule: rule.to_string(),
            cart,
            coupon,
            expectation,
            tolerance: settings.tolerance,
        };

        let rules = vec![
            Rule {
                matcher: Matcher::contains_any(["empty"]),
                directive: directive(
                    "empty-cart",
                    CartSetup {
                        add_items: false,
                        express_shipping: false,
                    },
                    Coupon::FromTestCase,
                    Expectation::Unchanged,
                ),
            },
            Rule {
                matcher: Matcher::contains_any(["invalid"]),
                directive: directive(
                    "invalid-code",
                    with_items,
                    Coupon::FromTestCase,
                    Expectation::Unchanged,
                ),
            },
            Rule {
                matcher: Matcher::contains_any(["FREESHIP"]),
                directive: directive(
                    "free-shipping",
                    CartSetup {
                        add_items: true,
                        express_shipping: true,
                    },
                    Coupon::Fixed("FREESHIP".to_string()),
                    Expectation::Reduced {
                        amount: settings.shipping_cost,
                    },
                ),
            },
            Rule {
                matcher: Matcher::contains_any(["SAVE15", "discount"]),
                directive: directive(
                    "percent-discount",
                    with_items,
                    Coupon::Fixed("SAVE15".to_string()),
                    Expectation::Scaled {
                        factor: settings.discount_factor,
                    },
                ),
            },
        ];
        let fallback = directive(
            "capture-only",
            with_items,
            Coupon::FromTestCase,
            Expectation::CaptureOnly,
        );
        Self::new(rules, fallback)
    }

    /// First directive whose matcher accepts `description`, else the fallback.
    pub fn evaluate(&self, description: &str) -> &Directive {
        self.rules
            .iter()
            .find(|r| r.matcher.matches(description))
            .map(|r| &r.directive)
            .unwrap_or(&self.fallback)
    }
}

impl Default for RuleBook {
    fn default() -> Self {
        Self::checkout(PricingSettings::default())
    }
}
