//! Prompt templates for request analysis

/// System message for the analysis call
pub const ANALYSIS_SYSTEM_PROMPT: &str = "You are the orchestrator of a project and task management assistant.\n\
Your job:\n\
1. Analyze the user's request\n\
2. Extract entities: projects, tasks, boards, actions, links, dates, times\n\
3. Build an ordered execution plan out of provider operations\n\n\
Available providers:\n\
- ATM (task manager): create and manage tasks and projects\n\
- ADM (data manager): all reads and writes of stored data\n\
- ACM (control manager): check data consistency after changes\n\
- AAM (analyze manager): metrics, statistics and reports\n\n\
Rules:\n\
- Every storage operation goes through ADM\n\
- After a change, verify it through ACM\n\
- If project_id is \"id+\", first ask ADM for the next free id\n\
- The plan must be sequential; each step may rely on the data of the previous ones";

/// User message for the analysis call
pub fn analysis_prompt(utterance: &str) -> String {
    format!(
        "Analyze the following user request and build an execution plan.\n\n\
         Request: {}\n\n\
         IMPORTANT: return ONLY valid JSON, with no extra text, markdown or comments.\n\n\
         Response format (strict JSON):\n\
         {{\n\
         \x20 \"intent\": \"create_project|update_task|query_data|close_task|add_todo_batch|...\",\n\
         \x20 \"entities\": {{\"project_id\": \"...\", \"project_name\": \"...\", \"task_id\": \"...\", \"board_name\": \"...\", \"date\": \"YYYY-MM-DD\"}},\n\
         \x20 \"plan\": [\n\
         \x20   {{\"agent\": \"ADM|ATM|ACM|AAM\", \"action\": \"...\", \"params\": {{}}}}\n\
         \x20 ]\n\
         }}",
        utterance
    )
}
