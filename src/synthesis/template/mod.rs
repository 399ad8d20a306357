
use tracing::debug;

use crate::synthesis::{Answer, AnswerSource};

/// Default confidence assigned to template answers. Low but never zero so
/// downstream consumers can still rank them.
pub const DEFAULT_TEMPLATE_CONFIDENCE: f32 = 0.1;

struct CategoryTemplate {
    category: &'static str,
    keywords: &'static [&'static str],
    summary: &'static str,
    steps: &'static [&'static str],
}

const TEMPLATES: &[CategoryTemplate] = &[
    CategoryTemplate {
        category: "network",
        keywords: &[
            "wifi", "wi", "internet", "network", "router", "modem", "ethernet", "connection",
            "disconnect", "dns", "signal",
        ],
        summary: "general network connectivity trouble",
        steps: &[
            "Restart your router and modem, then wait two minutes before reconnecting",
            "Forget the network on your device and reconnect with the correct password",
            "Move closer to the router or connect with an ethernet cable to rule out signal issues",
            "Check whether other devices on the same network are affected",
        ],
    },
    CategoryTemplate {
        category: "laptop",
        keywords: &[
            "laptop", "computer", "pc", "boot", "battery", "charger", "keyboard", "screen",
            "freeze", "slow", "crash",
        ],
        summary: "general computer trouble",
        steps: &[
            "Restart the computer and check whether the problem persists",
            "Install pending operating system and driver updates",
            "Unplug external devices and peripherals, then test again",
            "Check for overheating: clean vents and make sure fans are spinning",
        ],
    },
    CategoryTemplate {
        category: "printer",
        keywords: &[
            "printer", "print", "toner", "ink", "cartridge", "paper", "scan", "scanner", "jam",
        ],
        summary: "general printer trouble",
        steps: &[
            "Power-cycle the printer and reconnect its cable or wireless link",
            "Check for paper jams and reseat the ink or toner cartridges",
            "Clear the print queue on your computer and send a test page",
            "Reinstall or update the printer driver",
        ],
    },
    CategoryTemplate {
        category: "phone",
        keywords: &[
            "phone", "mobile", "android", "iphone", "tablet", "app", "touchscreen", "sim",
        ],
        summary: "general phone trouble",
        steps: &[
            "Restart the device",
            "Install pending system and app updates",
            "Free up storage space if the device is nearly full",
            "If one app misbehaves, clear its cache or reinstall it",
        ],
    },
    CategoryTemplate {
        category: "audio",
        keywords: &[
            "audio", "sound", "speaker", "microphone", "mic", "headphones", "volume", "mute",
        ],
        summary: "general audio trouble",
        steps: &[
            "Check that the correct output or input device is selected",
            "Unmute the device and raise the volume",
            "Reconnect headphones or speakers, trying a different port",
            "Update or reinstall the audio driver",
        ],
    },
];

const GENERIC_STEPS: &[&str] = &[
    "Restart the affected device",
    "Note any error messages or codes that appear and when the problem started",
    "Check for and install available software updates",
    "Undo any recent changes (new hardware, new software, settings)",
];

/// Dependency-free answer generator of last resort.
///
/// Classifies the query against known device categories by keyword overlap
/// and returns the closest generic template. Has no model, no network, and
/// no I/O, so it always succeeds.
#[derive(Debug, Clone)]
pub struct TemplateAnswerer {
    confidence: f32,
}

impl Default for TemplateAnswerer {
    #[inline]
    fn default() -> Self {
        Self {
            confidence: DEFAULT_TEMPLATE_CONFIDENCE,
        }
    }
}

impl TemplateAnswerer {
    #[inline]
    pub fn new(confidence: f32) -> Self {
        Self {
            confidence: confidence.clamp(0.01, 1.0),
        }
    }

    /// Produce a template answer for the query. Never fails.
    #[inline]
    pub fn fallback(&self, query_text: &str) -> Answer {
        let tokens: Vec<String> = query_text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(ToString::to_string)
            .collect();

        let best = TEMPLATES
            .iter()
            .map(|template| {
                let hits = template
                    .keywords
                    .iter()
                    .filter(|keyword| tokens.iter().any(|t| t == *keyword))
                    .count();
                (hits, template)
            })
            .filter(|(hits, _)| *hits > 0)
            .max_by_key(|(hits, template)| (*hits, std::cmp::Reverse(template.category)));

        match best {
            Some((hits, template)) => {
                debug!(
                    "Template fallback matched category '{}' with {} keyword hits",
                    template.category, hits
                );
                Answer {
                    text: format!(
                        "I couldn't find a close match in the knowledge base, but this sounds \
                         like {}. Here are some general steps that often help:",
                        template.summary
                    ),
                    steps: template.steps.iter().map(ToString::to_string).collect(),
                    confidence: self.confidence,
                    source: AnswerSource::Template,
                }
            }
            None => {
                debug!("Template fallback found no category match, using generic response");
                Answer {
                    text: "I don't have enough information to diagnose this issue precisely. \
                           These general steps are a good starting point:"
                        .to_string(),
                    steps: GENERIC_STEPS.iter().map(ToString::to_string).collect(),
                    confidence: self.confidence,
                    source: AnswerSource::Template,
                }
            }
        }
    }
}
