//! METS XML generation for an issue ready to batch. The descriptor is
//! rendered from issue + title + page data and written atomically so a
//! crash never leaves a truncated file for the batcher to pick up.

use std::path::Path;

use super::{load_issue, HandlerContext};
use crate::error::{EngineError, Result};
use crate::fsutil::write_atomic;
use presswork_model::Issue;

pub async fn build_mets(ctx: &HandlerContext<'_>) -> Result<()> {
    let issue = load_issue(ctx).await?;
    if issue.location.is_empty() {
        return Err(EngineError::Precondition(format!(
            "issue {} has no on-disk location for METS output",
            issue.id
        )));
    }

    let title_name = ctx
        .store
        .find_title_name(&issue.lccn)
        .await?
        .unwrap_or_default();

    let xml = render_mets(&issue, &title_name);
    let out = Path::new(&issue.location).join(format!("{}.xml", issue.human_name));
    ctx.logger
        .info(&format!("writing METS to {}", out.display()))
        .await;
    write_atomic(&out, xml.as_bytes())?;

    Ok(())
}

fn xml_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

fn render_mets(issue: &Issue, title_name: &str) -> String {
    let mut pages = String::new();
    for (idx, label) in issue.page_labels.iter().enumerate() {
        let seq = idx + 1;
        pages.push_str(&format!(
            "      <mets:div ID=\"pageModsBib{seq}\" ORDER=\"{seq}\" TYPE=\"np:page\" LABEL=\"{}\">\n        <mets:fptr FILEID=\"master{seq}\"/>\n      </mets:div>\n",
            xml_escape(label)
        ));
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<mets:mets xmlns:mets=\"http://www.loc.gov/METS/\" TYPE=\"urn:library-of-congress:ndnp:mets:newspaper:issue\" LABEL=\"{title} ({date}, edition {edition})\">\n\
  <mets:dmdSec ID=\"issueModsBib\">\n\
    <mets:mdWrap MDTYPE=\"MODS\">\n\
      <mets:xmlData>\n\
        <mods:mods xmlns:mods=\"http://www.loc.gov/mods/v3\">\n\
          <mods:relatedItem type=\"host\">\n\
            <mods:identifier type=\"lccn\">{lccn}</mods:identifier>\n\
          </mods:relatedItem>\n\
          <mods:originInfo>\n\
            <mods:dateIssued encoding=\"iso8601\">{date}</mods:dateIssued>\n\
          </mods:originInfo>\n\
          <mods:part>\n\
            <mods:detail type=\"volume\"><mods:number>{volume}</mods:number></mods:detail>\n\
            <mods:detail type=\"issue\"><mods:number>{issue_number}</mods:number></mods:detail>\n\
            <mods:detail type=\"edition\"><mods:number>{edition}</mods:number><mods:caption>{edition_label}</mods:caption></mods:detail>\n\
          </mods:part>\n\
        </mods:mods>\n\
      </mets:xmlData>\n\
    </mets:mdWrap>\n\
  </mets:dmdSec>\n\
  <mets:structMap>\n\
    <mets:div TYPE=\"np:issue\" DMDID=\"issueModsBib\">\n{pages}    </mets:div>\n\
  </mets:structMap>\n\
</mets:mets>\n",
        title = xml_escape(title_name),
        lccn = xml_escape(&issue.lccn),
        date = xml_escape(&issue.date),
        edition = issue.edition,
        edition_label = xml_escape(&issue.edition_label),
        volume = xml_escape(&issue.volume),
        issue_number = xml_escape(&issue.issue_number),
        pages = pages,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_page_divs_in_order() {
        let mut issue = Issue::new("oru", "sn12345678", "2024-01-15", 1);
        issue.page_labels = vec!["1".to_string(), "2".to_string(), "3".to_string()];
        let xml = render_mets(&issue, "The Daily Example");

        assert!(xml.contains("<mods:identifier type=\"lccn\">sn12345678</mods:identifier>"));
        assert!(xml.contains("ORDER=\"1\""));
        assert!(xml.contains("ORDER=\"3\""));
        assert!(xml.contains("The Daily Example"));
    }

    #[test]
    fn escapes_metadata_values() {
        let mut issue = Issue::new("oru", "sn12345678", "2024-01-15", 1);
        issue.page_labels = vec!["<1 & 2>".to_string()];
        let xml = render_mets(&issue, "Smith & Sons \"Gazette\"");

        assert!(xml.contains("Smith &amp; Sons &quot;Gazette&quot;"));
        assert!(xml.contains("LABEL=\"&lt;1 &amp; 2&gt;\""));
        assert!(!xml.contains("Smith & Sons"));
    }
}
