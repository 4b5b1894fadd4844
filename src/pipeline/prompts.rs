//! Prompt templates for every model-backed stage

use crate::pipeline::NO_INFO_ANSWER;

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

pub fn join_context(chunks: &[&str]) -> String {
    chunks.join(CONTEXT_SEPARATOR)
}

pub fn expansion(question: &str, count: usize) -> String {
    format!(
        "You are an expert in tax and financial law. Rephrase the user's question in {count} \
different ways to improve search in a legal knowledge base. Use synonyms and the formal \
terminology of statutes. Output one rephrasing per line, without numbering or commentary.\n\n\
Question: {question}"
    )
}

pub fn hypothetical_answer(question: &str) -> String {
    format!(
        "Write a short, plausible answer to the question below as it might appear in a tax code \
or an official commentary. The answer is only used to search for relevant passages, so precision \
of wording matters more than correctness.\n\nQuestion: {question}\n\nAnswer:"
    )
}

pub fn answer(context: &str, question: &str) -> String {
    format!(
        "You are an authoritative but approachable financial and tax expert. Answer the user's \
question using only the context below.\n\n\
Rules:\n\
- Start with a direct answer of one or two sentences in bold.\n\
- Then explain the details with short headed sections and bullet lists, citing articles and \
figures that appear in the context.\n\
- Finish with practical next steps.\n\
- Do not add facts that are not in the context and never mention the context itself.\n\
- If the context contains no information for the answer, reply with exactly this sentence and \
nothing else: {NO_INFO_ANSWER}\n\n\
### CONTEXT\n{context}\n\n### QUESTION\n{question}\n\n### ANSWER\n"
    )
}

pub fn grade(question: &str, answer: &str, context: &str) -> String {
    format!(
        "Rate how well the answer addresses the question, judging completeness, accuracy with \
respect to the context, and clarity. Reply with a single number between 0.0 and 1.0.\n\n\
### CONTEXT\n{context}\n\n### QUESTION\n{question}\n\n### ANSWER\n{answer}\n\n### SCORE\n"
    )
}

pub fn refine(question: &str, context: &str, previous: &str) -> String {
    format!(
        "Improve the draft answer below. Keep every correct statement, fill gaps using the \
context, fix anything the context contradicts and make the structure clearer. Use only the \
context. If the context contains no information for the answer, reply with exactly: \
{NO_INFO_ANSWER}\n\n\
### CONTEXT\n{context}\n\n### QUESTION\n{question}\n\n### DRAFT\n{previous}\n\n### IMPROVED ANSWER\n"
    )
}

pub fn reflect(question: &str, context: &str, answer: &str) -> String {
    format!(
        "Critique the answer to the question. Decide whether the context was sufficient or \
whether another search of the knowledge base is needed to answer completely.\n\n\
Reply with a JSON object only:\n\
{{\"critique\": \"<what is missing or wrong>\", \"action\": \"search\" or \"finish\", \
\"new_query\": \"<search query when action is search>\"}}\n\n\
### CONTEXT\n{context}\n\n### QUESTION\n{question}\n\n### ANSWER\n{answer}\n"
    )
}
