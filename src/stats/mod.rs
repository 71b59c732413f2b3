//! Statistical primitives: moments, one-way ANOVA, Tukey HSD and
//! Benjamini–Hochberg correction.

pub mod anova;
pub mod describe;
pub mod fdr;
pub mod tukey;

pub use anova::{one_way, OneWay};
pub use fdr::benjamini_hochberg;
pub use tukey::{ptukey, tukey_hsd, TukeyContrast};
