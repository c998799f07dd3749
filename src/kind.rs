use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The diagram categories the generator knows how to ask for.
///
/// The serialized form is the Mermaid declaration keyword, which is also what
/// gets persisted under the `diagramType` preference key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DiagramKind {
    #[default]
    #[serde(rename = "flowchart")]
    Flowchart,
    #[serde(rename = "sequenceDiagram")]
    Sequence,
    #[serde(rename = "gantt")]
    Gantt,
    #[serde(rename = "classDiagram")]
    Class,
    #[serde(rename = "stateDiagram-v2")]
    State,
}

const FLOWCHART_TEMPLATE: &str = "- Receive the application form at the front desk\n\
- Next, check the contents\n\
- If something is missing -> ask for a correction\n\
- If everything is in order -> accept it\n\
- Register the application";

const SEQUENCE_TEMPLATE: &str = "User: open the login page\n\
Server: show the login page\n\
User: enter ID and password and submit\n\
Server: authenticate\n\
Server: return the authentication result to the user";

const GANTT_TEMPLATE: &str = "Project plan\n\
Design: 2024-10-01, 5d\n\
Development: 2024-10-06, 10d\n\
Testing: 2024-10-16, 7d";

const CLASS_TEMPLATE: &str = "class Animal\n\
<<interface>> Animal\n\
Animal <|-- Duck\n\
Animal <|-- Fish\n\
Animal : +String name\n\
Animal : +go()";

const STATE_TEMPLATE: &str = "[*] --> Still\n\
Still --> [*]\n\
Still --> Moving\n\
Moving --> Still\n\
Moving --> Crash\n\
Crash --> [*]";

impl DiagramKind {
    pub const ALL: [DiagramKind; 5] = [
        DiagramKind::Flowchart,
        DiagramKind::Sequence,
        DiagramKind::Gantt,
        DiagramKind::Class,
        DiagramKind::State,
    ];

    /// The declaration keyword a diagram of this kind starts with.
    pub fn keyword(self) -> &'static str {
        match self {
            DiagramKind::Flowchart => "flowchart",
            DiagramKind::Sequence => "sequenceDiagram",
            DiagramKind::Gantt => "gantt",
            DiagramKind::Class => "classDiagram",
            DiagramKind::State => "stateDiagram-v2",
        }
    }

    /// Human-readable name used in prompts.
    pub fn display_name(self) -> &'static str {
        match self {
            DiagramKind::Flowchart => "Flowchart (flowchart TD)",
            DiagramKind::Sequence => "Sequence diagram (sequenceDiagram)",
            DiagramKind::Gantt => "Gantt chart (gantt)",
            DiagramKind::Class => "Class diagram (classDiagram)",
            DiagramKind::State => "State diagram (stateDiagram-v2)",
        }
    }

    /// Short label for menus and prompts.
    pub fn label(self) -> &'static str {
        match self {
            DiagramKind::Flowchart => "flowchart",
            DiagramKind::Sequence => "sequence",
            DiagramKind::Gantt => "gantt",
            DiagramKind::Class => "class",
            DiagramKind::State => "state",
        }
    }

    /// Starter text offered when this kind is selected.
    pub fn template(self) -> &'static str {
        match self {
            DiagramKind::Flowchart => FLOWCHART_TEMPLATE,
            DiagramKind::Sequence => SEQUENCE_TEMPLATE,
            DiagramKind::Gantt => GANTT_TEMPLATE,
            DiagramKind::Class => CLASS_TEMPLATE,
            DiagramKind::State => STATE_TEMPLATE,
        }
    }
}

impl fmt::Display for DiagramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for DiagramKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        DiagramKind::ALL
            .into_iter()
            .find(|kind| {
                normalized == kind.label() || normalized == kind.keyword().to_ascii_lowercase()
            })
            .ok_or_else(|| {
                let known: Vec<&str> = DiagramKind::ALL.iter().map(|k| k.label()).collect();
                format!("Unknown diagram kind '{}'. Available: {}", s, known.join(", "))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::DiagramKind;

    #[test]
    fn parses_labels_and_keywords_case_insensitively() {
        assert_eq!("Sequence".parse::<DiagramKind>(), Ok(DiagramKind::Sequence));
        assert_eq!("sequencediagram".parse::<DiagramKind>(), Ok(DiagramKind::Sequence));
        assert_eq!("stateDiagram-v2".parse::<DiagramKind>(), Ok(DiagramKind::State));
        assert_eq!(" class ".parse::<DiagramKind>(), Ok(DiagramKind::Class));
    }

    #[test]
    fn unknown_kind_lists_alternatives() {
        let err = "pie".parse::<DiagramKind>().unwrap_err();
        assert!(err.contains("flowchart, sequence, gantt, class, state"));
    }

    #[test]
    fn serializes_as_keyword() {
        let json = serde_json::to_string(&DiagramKind::State).unwrap();
        assert_eq!(json, "\"stateDiagram-v2\"");
        let back: DiagramKind = serde_json::from_str("\"classDiagram\"").unwrap();
        assert_eq!(back, DiagramKind::Class);
    }

    #[test]
    fn every_kind_has_a_template_and_named_keyword() {
        for kind in DiagramKind::ALL {
            assert!(!kind.template().trim().is_empty());
            assert!(kind.display_name().contains(kind.keyword()));
        }
    }
}
