//! Built-in extraction stages and the site dictionary.
//!
//! Every stage is a pure `fn(&str) -> Option<String>` over a filename stem
//! and returns the raw (not yet normalized) identifier.

use lazy_static::lazy_static;
use regex::Regex;

/// A site-specific rule: `detector` decides whether the rule applies,
/// `extract` pulls the identifier out.
pub(crate) struct SiteRule {
    pub name: &'static str,
    detector: Regex,
    extract: fn(&str) -> Option<String>,
}

impl SiteRule {
    fn new(name: &'static str, detector: &str, extract: fn(&str) -> Option<String>) -> Self {
        Self {
            name,
            detector: Regex::new(detector).expect("valid site detector"),
            extract,
        }
    }

    pub fn apply(&self, stem: &str) -> Option<String> {
        if self.detector.is_match(stem) {
            (self.extract)(stem)
        } else {
            None
        }
    }
}

lazy_static! {
    /// Site domains, resolution and codec tags, leak markers
    pub(crate) static ref JUNK_TOKENS: Regex = Regex::new(
        r"(?i)^\w+\.(cc|com|net|me|club|jp|tv|xyz|biz|wiki|info|tw|us|de)@|^22-sht\.me|^(fhd|hd|sd|1080p|720p|4K)(-|_)|(-|_)(fhd|hd|sd|1080p|720p|4K|x264|x265|uncensored|hack|leak)"
    )
    .expect("valid junk pattern");

    static ref BRACKETED: Regex = Regex::new(r"\[.*?\]").expect("valid bracket pattern");
    static ref RELEASE_DATE: Regex =
        Regex::new(r"\[\d{4}-\d{1,2}-\d{1,2}\] - ").expect("valid date pattern");
    static ref FOREIGN_SCRIPT: Regex =
        Regex::new(r"[\p{Hiragana}\p{Katakana}]").expect("valid script pattern");
    pub(crate) static ref CD_SUFFIX: Regex = Regex::new(r"(?i)[-_]cd\d{1,2}").expect("valid cd pattern");
    static ref FC2_CODE: Regex =
        Regex::new(r"(?i)FC2[-_]?(?:PPV[-_]?)?(\d+)").expect("valid fc2 pattern");
    static ref FIRST_WORD: Regex = Regex::new(r"[0-9A-Za-z_]+").expect("valid word pattern");
    static ref COMPOUND_CODE: Regex =
        Regex::new(r"(?i)([a-z]+[-_][a-z]+)[-_](\d+)").expect("valid compound pattern");
    static ref STANDARD_CODE: Regex =
        Regex::new(r"(?i)([a-z]+)[-_](\d+)").expect("valid standard pattern");
    static ref ALNUM_RUN: Regex = Regex::new(r"[a-zA-Z0-9_-]+").expect("valid run pattern");
    static ref CATALOG_NUMBER: Regex = Regex::new(r"^\d{6,}$").expect("valid catalog pattern");
    static ref FUSED_CODE: Regex =
        Regex::new(r"^([a-zA-Z]+)(\d+)$").expect("valid fused pattern");

    static ref TOKYO_HOT_CODE: Regex =
        Regex::new(r"(?i)(cz|gedo|k|n|red-|se)\d{2,4}").expect("valid tokyo-hot pattern");
    static ref DATED_RELEASE_3: Regex =
        Regex::new(r"\d{6}(-|_)\d{3}").expect("valid dated pattern");
    static ref DATED_RELEASE_2: Regex =
        Regex::new(r"\d{6}(-|_)\d{2}").expect("valid dated pattern");
    static ref X_ART_CODE: Regex =
        Regex::new(r"(?i)x-art\.\d{2}\.\d{2}\.\d{2}").expect("valid x-art pattern");
    static ref XXX_AV_CODE: Regex =
        Regex::new(r"(?i)xxx-av[^\d]*(\d{3,5})").expect("valid xxx-av pattern");
    static ref HEYDOUGA_CODE: Regex =
        Regex::new(r"(\d{4})[-_](\d{3,4})").expect("valid heydouga pattern");
    static ref HEYZO_CODE: Regex =
        Regex::new(r"(?i)heyzo[^\d]*(\d{4})").expect("valid heyzo pattern");
    static ref MDBK_CODE: Regex = Regex::new(r"(?i)mdbk[-_]\d{4}").expect("valid mdbk pattern");
    static ref MDTM_CODE: Regex = Regex::new(r"(?i)mdtm[-_]\d{4}").expect("valid mdtm pattern");

    /// Checked in order; the first rule that detects and extracts wins
    pub(crate) static ref SITE_RULES: Vec<SiteRule> = vec![
        SiteRule::new("tokyo-hot", r"(?i)tokyo.*hot", tokyo_hot),
        SiteRule::new("caribbeancom-premium", r"(?i)caribpr", caribbeancom),
        SiteRule::new("caribbeancom", r"(?i)carib", caribbeancom),
        SiteRule::new("1pondo", r"(?i)1pon|mura|paco", one_pondo),
        SiteRule::new("10musume", r"(?i)10mu", ten_musume),
        SiteRule::new("x-art", r"(?i)x-art", x_art),
        SiteRule::new("xxx-av", r"(?i)xxx-av", xxx_av),
        SiteRule::new("heydouga", r"(?i)heydouga", heydouga),
        SiteRule::new("heyzo", r"(?i)heyzo", heyzo),
        SiteRule::new("mdbk", r"(?i)mdbk", mdbk),
        SiteRule::new("mdtm", r"(?i)mdtm", mdtm),
    ];
}

fn whole_match(pattern: &Regex, stem: &str) -> Option<String> {
    pattern.find(stem).map(|m| m.as_str().to_string())
}

fn tokyo_hot(stem: &str) -> Option<String> {
    whole_match(&TOKYO_HOT_CODE, stem)
}

fn caribbeancom(stem: &str) -> Option<String> {
    whole_match(&DATED_RELEASE_3, stem).map(|id| id.replace('_', "-"))
}

fn one_pondo(stem: &str) -> Option<String> {
    whole_match(&DATED_RELEASE_3, stem).map(|id| id.replace('-', "_"))
}

fn ten_musume(stem: &str) -> Option<String> {
    whole_match(&DATED_RELEASE_2, stem).map(|id| id.replace('-', "_"))
}

fn x_art(stem: &str) -> Option<String> {
    whole_match(&X_ART_CODE, stem)
}

fn xxx_av(stem: &str) -> Option<String> {
    XXX_AV_CODE
        .captures(stem)
        .map(|caps| format!("xxx-av-{}", &caps[1]))
}

fn heydouga(stem: &str) -> Option<String> {
    HEYDOUGA_CODE
        .captures(stem)
        .map(|caps| format!("heydouga-{}-{}", &caps[1], &caps[2]))
}

fn heyzo(stem: &str) -> Option<String> {
    HEYZO_CODE
        .captures(stem)
        .map(|caps| format!("HEYZO-{}", &caps[1]))
}

fn mdbk(stem: &str) -> Option<String> {
    whole_match(&MDBK_CODE, stem)
}

fn mdtm(stem: &str) -> Option<String> {
    whole_match(&MDTM_CODE, stem)
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

pub(crate) fn site_rule(stem: &str) -> Option<String> {
    SITE_RULES.iter().find_map(|rule| {
        let found = rule.apply(stem)?;
        tracing::trace!(rule = rule.name, raw = %found, "Site rule matched");
        Some(found)
    })
}

/// Fansub releases and names in Japanese script
pub(crate) fn subtitle_release(stem: &str) -> Option<String> {
    let applies = stem.contains("字幕组")
        || stem.to_uppercase().contains("SUB")
        || FOREIGN_SCRIPT.is_match(stem);
    if !applies {
        return None;
    }

    let cleaned = JUNK_TOKENS.replace_all(stem, "");
    let cleaned = BRACKETED.replace_all(&cleaned, "");
    let cleaned = cleaned.replace(".chs", "").replace(".cht", "");

    // text before the first '.' that is not the leading character
    let (dot, _) = cleaned.char_indices().skip(1).find(|(_, c)| *c == '.')?;
    non_empty(cleaned[..dot].trim().to_string())
}

/// Names using `-` or `_` between label and number
pub(crate) fn separated_code(stem: &str) -> Option<String> {
    if !stem.contains(['-', '_']) {
        return None;
    }

    let cleaned = JUNK_TOKENS.replace_all(stem, "");
    let mut cleaned = RELEASE_DATE.replace_all(&cleaned, "").into_owned();

    if cleaned.to_lowercase().contains("fc2") {
        cleaned = cleaned.replace("--", "-").replace('_', "-").to_uppercase();
        if let Some(caps) = FC2_CODE.captures(&cleaned) {
            return Some(format!("FC2-{}", &caps[1]));
        }
    }

    let cleaned = CD_SUFFIX.replace_all(&cleaned, "");

    if !cleaned.contains(['-', '_']) {
        let dotted = cleaned.find('.').map_or(false, |dot| dot > 0);
        if dotted {
            if let Some(word) = FIRST_WORD.find(&cleaned) {
                return Some(word.as_str().to_string());
            }
        }
    }

    if let Some(caps) = COMPOUND_CODE.captures(&cleaned) {
        return Some(format!(
            "{}-{}",
            caps[1].replace('_', "-").to_uppercase(),
            &caps[2]
        ));
    }

    if let Some(caps) = STANDARD_CODE.captures(&cleaned) {
        return Some(format!("{}-{}", caps[1].to_uppercase(), &caps[2]));
    }

    ALNUM_RUN
        .find(&cleaned)
        .map(|run| run.as_str().to_uppercase())
}

/// Names without separators: catalog numbers and fused label+number
pub(crate) fn fused_code(stem: &str) -> Option<String> {
    let cleaned = JUNK_TOKENS.replace_all(stem, "");
    let cleaned = CD_SUFFIX.replace_all(&cleaned, "");

    if CATALOG_NUMBER.is_match(&cleaned) {
        return Some(cleaned.into_owned());
    }

    if let Some(caps) = FUSED_CODE.captures(&cleaned) {
        return Some(format!("{}-{}", caps[1].to_uppercase(), &caps[2]));
    }

    if let Some(dot) = cleaned.find('.').filter(|dot| *dot > 0) {
        if let Some(word) = FIRST_WORD.find(&cleaned[..dot]) {
            return Some(word.as_str().to_uppercase());
        }
    }

    non_empty(cleaned.to_uppercase())
}
