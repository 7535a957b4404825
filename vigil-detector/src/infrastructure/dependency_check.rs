//! CPE extraction from OWASP Dependency-Check XML reports

use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;

use vigil_core::{DetectionError, ParseError};

/// Read a Dependency-Check report and return the CPE names it identified
pub async fn read_cpe_names(path: &Path) -> Result<Vec<String>, DetectionError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| DetectionError::io(path, e))?;
    parse_cpe_names(&content).map_err(|message| {
        DetectionError::Parse(ParseError::Document {
            path: path.display().to_string(),
            message,
        })
    })
}

/// CPE names from `<identifier type="cpe"><name>` (report schema 1.x) and
/// `<vulnerabilityIds><id>` (schema 2.x), in document order without duplicates
pub fn parse_cpe_names(content: &str) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_str(content);
    let mut buf = Vec::new();

    let mut cpes: Vec<String> = Vec::new();
    let mut in_cpe_identifier = false;
    let mut in_vulnerability_ids = false;
    let mut current_tag: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                match name.as_str() {
                    "identifier" => {
                        in_cpe_identifier = e.attributes().flatten().any(|attr| {
                            attr.key.as_ref() == b"type" && attr.value.as_ref() == b"cpe"
                        });
                    }
                    "vulnerabilityIds" => in_vulnerability_ids = true,
                    _ => {}
                }
                current_tag = Some(name);
            }
            Ok(Event::End(e)) => {
                match e.local_name().as_ref() {
                    b"identifier" => in_cpe_identifier = false,
                    b"vulnerabilityIds" => in_vulnerability_ids = false,
                    _ => {}
                }
                current_tag = None;
            }
            Ok(Event::Text(t)) => {
                let wanted = match current_tag.as_deref() {
                    Some("name") => in_cpe_identifier,
                    Some("id") => in_vulnerability_ids,
                    _ => false,
                };
                if wanted {
                    let text = reader
                        .decoder()
                        .decode(t.as_ref())
                        .unwrap_or_default()
                        .trim()
                        .to_string();
                    if text.starts_with("cpe:") && !cpes.contains(&text) {
                        cpes.push(text);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "XML parse error at position {}: {}",
                    reader.buffer_position(),
                    e
                ));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(cpes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT_V1: &str = r#"<?xml version="1.0"?>
<analysis xmlns="https://jeremylong.github.io/DependencyCheck/dependency-check.1.8.xsd">
  <dependencies>
    <dependency>
      <fileName>struts2-core-2.5.10.jar</fileName>
      <identifiers>
        <identifier type="maven" confidence="HIGH">
          <name>(org.apache.struts:struts2-core:2.5.10)</name>
        </identifier>
        <identifier type="cpe" confidence="HIGHEST">
          <name>cpe:/a:apache:struts:2.5.10</name>
        </identifier>
      </identifiers>
    </dependency>
    <dependency>
      <fileName>struts2-convention-plugin-2.5.10.jar</fileName>
      <identifiers>
        <identifier type="cpe" confidence="HIGHEST">
          <name>cpe:/a:apache:struts:2.5.10</name>
        </identifier>
      </identifiers>
    </dependency>
  </dependencies>
</analysis>"#;

    const REPORT_V2: &str = r#"<?xml version="1.0"?>
<analysis xmlns="https://jeremylong.github.io/DependencyCheck/dependency-check.2.5.xsd">
  <dependencies>
    <dependency>
      <fileName>jackson-databind-2.9.8.jar</fileName>
      <identifiers>
        <package confidence="HIGH"><id>pkg:maven/com.fasterxml.jackson.core/jackson-databind@2.9.8</id></package>
        <vulnerabilityIds confidence="HIGHEST">
          <id>cpe:2.3:a:fasterxml:jackson-databind:2.9.8:*:*:*:*:*:*:*</id>
        </vulnerabilityIds>
      </identifiers>
    </dependency>
  </dependencies>
</analysis>"#;

    #[test]
    fn test_schema_1_identifiers() {
        let cpes = parse_cpe_names(REPORT_V1).unwrap();
        assert_eq!(cpes, vec!["cpe:/a:apache:struts:2.5.10".to_string()]);
    }

    #[test]
    fn test_schema_2_vulnerability_ids() {
        let cpes = parse_cpe_names(REPORT_V2).unwrap();
        assert_eq!(
            cpes,
            vec!["cpe:2.3:a:fasterxml:jackson-databind:2.9.8:*:*:*:*:*:*:*".to_string()]
        );
    }

    #[test]
    fn test_malformed_report() {
        assert!(parse_cpe_names("<analysis><dependencies></analysis>").is_err());
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let err = read_cpe_names(Path::new("/nonexistent/dependency-check-report.xml"))
            .await
            .unwrap_err();
        assert!(matches!(err, DetectionError::Io { .. }));
    }
}
