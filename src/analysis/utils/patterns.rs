//! Common regex patterns for manuscript analysis
//!
//! Pre-compiled patterns shared by the analyzers.

use once_cell::sync::Lazy;
use regex::Regex;

/// Common patterns used across analyzers
pub struct CommonPatterns;

impl CommonPatterns {
    /// Word tokens, keeping internal apostrophes ("didn't", "Elena’s")
    pub fn word() -> &'static Regex {
        static PATTERN: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"[\p{L}\p{N}]+(?:['’][\p{L}\p{N}]+)*").expect("Valid word regex")
        });
        &PATTERN
    }

    /// Quoted dialogue, straight or curly quotes, single line
    pub fn dialogue() -> &'static Regex {
        static PATTERN: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r#""[^"\n]*"|“[^”\n]*”"#).expect("Valid dialogue regex")
        });
        &PATTERN
    }

    /// Speaker attribution directly after a closing quote: `" said Mara` / `" Mara said`
    pub fn speaker_after_quote() -> &'static Regex {
        static PATTERN: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"^[,\s]*(?:(?:said|asked|whispered|shouted|replied|muttered|called)\s+([A-Z][\p{L}]+)|([A-Z][\p{L}]+)\s+(?:said|asked|whispered|shouted|replied|muttered|called))")
                .expect("Valid speaker regex")
        });
        &PATTERN
    }

    /// A whole line that is a scene break marker
    pub fn scene_break_line() -> &'static Regex {
        static PATTERN: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"^(?:(?:\*\s*){3,}|(?:-\s*){3,}|(?:~\s*){3,}|(?:#\s*){1,3}|#{1,6}\s+\S.*|§|⁂)$")
                .expect("Valid scene break regex")
        });
        &PATTERN
    }

    /// Auxiliary verb + past participle
    pub fn passive_voice() -> &'static Regex {
        static PATTERN: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?i)\b(?:am|is|are|was|were|be|been|being|get|gets|got|gotten)\s+(?:\w+ly\s+)?(?:\w+ed|made|done|seen|known|given|taken|held|kept|left|told|found|built|caught|taught|bought|brought|heard|sent|spent|led|paid|shot|struck|hit|hurt|put|shut|lost|won|thrown|shown|drawn|worn|torn|born|sworn|broken|spoken|stolen|chosen|frozen|forgotten|written|driven|ridden|hidden|bitten|eaten|beaten|fallen|forgiven|woken)\b")
                .expect("Valid passive voice regex")
        });
        &PATTERN
    }

    /// Tokens ending in -ly
    pub fn ly_word() -> &'static Regex {
        static PATTERN: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"(?i)\b[a-z]{2,}ly\b").expect("Valid -ly regex"));
        &PATTERN
    }

    /// Capitalized name runs, optionally joined by "of"/"the" ("Tower of London")
    pub fn name_run() -> &'static Regex {
        static PATTERN: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"\b\p{Lu}[\p{L}’']*(?:[ \t]+(?:of[ \t]+(?:the[ \t]+)?)?\p{Lu}[\p{L}’']*)*")
                .expect("Valid name run regex")
        });
        &PATTERN
    }

    /// Appositive description: `Mara, a smuggler,` / `Mara, the captain`
    pub fn appositive() -> &'static Regex {
        static PATTERN: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"\b(\p{Lu}[\p{L}]+),\s+(?:a|an|the)\s+([\p{Ll}]+(?:\s+[\p{Ll}]+)?)[,.]")
                .expect("Valid appositive regex")
        });
        &PATTERN
    }

    /// Location phrase: `in the kitchen`, `at Ravenhold`
    pub fn location_phrase() -> &'static Regex {
        static PATTERN: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"\b(?:in|at|inside|into|outside|across|through)\s+(?:the\s+)?(\p{Lu}[\p{L}]+(?:\s+\p{Lu}[\p{L}]+)*|[\p{Ll}]+)")
                .expect("Valid location phrase regex")
        });
        &PATTERN
    }

    /// First- and third-person pronouns for POV estimation
    pub fn first_person() -> &'static Regex {
        static PATTERN: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"\b(?:I|[Mm]e|[Mm]y|[Mm]ine|[Mm]yself)\b").expect("Valid first person regex")
        });
        &PATTERN
    }
}

/// Promise language cues
pub struct PromisePatterns;

impl PromisePatterns {
    /// Goal language: a character commits to something
    pub fn goal() -> &'static Regex {
        static PATTERN: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?i)\b(?:wants? to|wanted to|needs? to|needed to|vowed to|swore to|sworn to|determined to|had to|planned to|plans to|promised to|promises to|intends? to|intended to|set out to|resolved to|would find|was going to|is going to)\b")
                .expect("Valid goal regex")
        });
        &PATTERN
    }

    /// Setup language: something is planted for later
    pub fn setup() -> &'static Regex {
        static PATTERN: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?i)\b(?:someday|one day|would regret|remember this|little did|a secret|never told|no one knew|mysterious|locked away|hidden away|sealed|prophecy|foretold|warned that|would return)\b")
                .expect("Valid setup regex")
        });
        &PATTERN
    }

    /// Payoff language: something planted resolves
    pub fn payoff() -> &'static Regex {
        static PATTERN: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?i)\b(?:finally|at last|kept (?:his|her|their|my) (?:promise|word|vow)|fulfilled|was revealed|revealed|the truth was|turned out|resolved|avenged|found it|found the|returned at last)\b")
                .expect("Valid payoff regex")
        });
        &PATTERN
    }
}
