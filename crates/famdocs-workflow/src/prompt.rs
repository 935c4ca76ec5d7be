//! Prompt templates for document generation and chat queries.

use famdocs_core::{
  document::{Document, DocumentKind},
  family::FamilyMember,
};

/// Build the generation prompt for `kind`, interpolating the member's
/// personal data and the caller's free-text context.
pub fn document_prompt(kind: DocumentKind, member: &FamilyMember, additional_info: &str) -> String {
  let name = &member.full_name;
  let birth_date = member.birth_date.format("%Y-%m-%d");
  let nationality = &member.nationality;

  match kind {
    DocumentKind::Authorization => format!(
      "Write a travel authorization for a minor with the following details:\n\
       - Name of the minor: {name}\n\
       - Date of birth: {birth_date}\n\
       - Nationality: {nationality}\n\
       \n\
       Additional information: {additional_info}\n\
       \n\
       The document must be formal and include every field a travel \
       authorization requires."
    ),
    DocumentKind::Declaration => format!(
      "Write a formal declaration with the following details:\n\
       - Name: {name}\n\
       - Date of birth: {birth_date}\n\
       - Nationality: {nationality}\n\
       \n\
       Purpose of the declaration: {additional_info}\n\
       \n\
       The document must be formal and suitable for official use."
    ),
    DocumentKind::Certificate => format!(
      "Write a certificate or attestation with the following details:\n\
       - Name: {name}\n\
       - Date of birth: {birth_date}\n\
       - Nationality: {nationality}\n\
       \n\
       Certificate details: {additional_info}\n\
       \n\
       The document must follow formal certification standards."
    ),
  }
}

/// Build the context-plus-question prompt for a chat query. With no member
/// the context section is empty.
pub fn query_prompt(member: Option<&FamilyMember>, documents: &[Document], query: &str) -> String {
  let mut context = Vec::new();

  if let Some(member) = member {
    context.push(format!("Member: {}", member.full_name));
    context.push(format!("Born: {}", member.birth_date.format("%Y-%m-%d")));
    context.push(format!("Nationality: {}", member.nationality));
  }

  if !documents.is_empty() {
    context.push(String::new());
    context.push("Documents:".to_owned());
    for doc in documents {
      let mut line = format!(
        "- {} ({}, number {}, issued by {})",
        doc.title, doc.document_type, doc.document_number, doc.issuing_country
      );
      if let Some(expiry) = doc.expiration_date {
        line.push_str(&format!(" - expires {}", expiry.format("%Y-%m-%d")));
      }
      context.push(line);
    }
  }

  format!(
    "Context:\n{}\n\nQuestion: {query}\n\n\
     Answer clearly and directly, using only the information provided. \
     If the information is not enough, say so.",
    context.join("\n")
  )
}
