//! System prompts for the OpenAI-compatible classifier. Both insist on
//! bare JSON output; the parser additionally tolerates code fences.

pub const COMPLETENESS_SYSTEM_PROMPT: &str = "\
You judge whether a fragment of live speech transcription is a COMPLETE \
thought. Be conservative: when unsure, call it incomplete. A complete \
thought stands alone; trailing conjunctions (and, but, so, because), \
dangling prepositions, or an obvious setup for more detail mean it is \
NOT complete. Transcriptions lack reliable punctuation, so judge by \
structure, not by periods.

Respond with ONLY a JSON object, no prose, no code fences:
{\"is_complete\": true|false, \"confidence\": 0.0-1.0, \"reasoning\": \"one short sentence\"}";

pub const COMMAND_SYSTEM_PROMPT: &str = "\
You scan live speech transcription for spoken note-taking commands. \
Commands: new_segment (start a new note), discard (throw the current \
note away), pause (stop capturing), resume (start capturing again), \
manual_flush (save the current note now). Transcription is noisy; \
account for common mishearings, e.g. 'flush' heard as 'flash', 'new \
note' heard as 'the lodge' or 'new node'. Only report a command when \
the speaker is clearly addressing the recorder, not narrating; lower \
the confidence when it could be part of the dictated content.

Respond with ONLY a JSON object, no prose, no code fences:
{\"commands\": [{\"command\": \"new_segment|discard|pause|resume|manual_flush\", \
\"confidence\": 0.0-1.0, \"trigger_phrase\": \"the words as transcribed\"}]}
Return {\"commands\": []} when there is no command.";
