//! Prompt text for the three assistants the pipeline converses with.

use crate::metapath::Metapath;
use statewalk_graph::KindCatalog;

// ============================================================================
// Root-cause locator
// ============================================================================

pub const LOCATOR_NAME: &str = "k8s-root-cause-locator";

pub const LOCATOR_INSTRUCTIONS: &str = "\
You are an expert in Kubernetes (k8s) systems: the components and API resources of a cluster \
and the external systems a cluster depends on, such as storage, container networks and image \
registries.

Given an error message from a cluster, identify the elements of the message that point at the \
underlying issue, relate them to the k8s objects involved (pods, nodes, deployments, statefulsets, \
daemonsets, jobs, services, ingresses, network policies, volumes, PersistentVolumes, \
PersistentVolumeClaims, secrets, configmaps, service accounts, roles and bindings) and to the \
external systems around them, and reason about which interactions could have produced the error.

Answer in a structured, neutral way and do not speculate beyond what the message supports. \
Never access external systems; rely on the message and your knowledge only.";

/// Standing prompt for locating the destination kind of `src_kind`'s error.
pub fn locator_prompt(catalog: &KindCatalog, src_kind: &str, message: &str) -> String {
    format!(
        "The predefined k8s API resource kinds and external resource kinds are the following:\n\n\
         k8s-api-resource-kinds: {native}\n\n\
         k8s-external-resource-kinds: {external}\n\n\
         Perform an analysis on the Kubernetes error message that mentions a {src}. \
         Follow these steps to prepare the analysis:\n\n\
         1. Recognize the {src} as the starting point of the issue.\n\
         2. Determine the 'destKind' within the specified k8s API resource kinds and k8s external \
         resource kinds that provides a resolution to the problem.\n\
         3. Enumerate the most critical k8s API and external resources relevant to the matter \
         within the predefined kinds.\n\
         4. Chart the primary progression from {src} to 'destKind', including the most relevant \
         resources as waypoints.\n\
         5. Output the findings in JSON format inside a ```json fenced block, with no additional \
         description, following this structure:\n\
         ```json\n\
         {{\n\
         \x20   \"SourceKind\": \"{src}\",\n\
         \x20   \"DestinationKind\": \"destKind\",\n\
         \x20   \"RelevantResources\": [\"Resource1\", \"Resource2\", \"{src}\", \"destKind\"],\n\
         \x20   \"PrimaryPath\": [\n\
         \x20       {{\"Edge\": 1, \"start\": \"{src}\", \"end\": \"Resource1\"}},\n\
         \x20       {{\"Edge\": 2, \"start\": \"Resource1\", \"end\": \"destKind\"}}\n\
         \x20   ]\n\
         }}\n\
         ```\n\
         Analyze the following error message, ensuring 'destKind' and the resources are strictly \
         limited to the provided lists:\n\n{message}\n",
        native = catalog.native.join(", "),
        external = catalog.external.join(", "),
        src = src_kind,
        message = message,
    )
}

pub fn locator_json_correction(error: &str) -> String {
    format!(
        "The previous answer could not be used:\nJSON Error occurred: {error}\n\
         make sure to return the output in JSON format, and put it in ```json <dest_relevant> ```"
    )
}

// ============================================================================
// Query generator
// ============================================================================

pub const GENERATOR_NAME: &str = "cypher-query-generator";

pub const GENERATOR_INSTRUCTIONS: &str = "You are an expert in neo4j and cypher query language.";

pub const GENERATION_LABEL: &str = "Let's label the following prompt template as \
generation-template-1, and use it to generate cypher query later";

pub const GENERATION_TEMPLATE: &str = r#"Cypher Query Generation Prompt Template
Use this template to construct a Cypher query that follows a given metapath and filters EVENT nodes on the content of their 'message' property.

1. Analyze the metapath and the error message:
   - Each metapath segment is "relType, srcKind, destKind, propertyValue". Every relationship carries a property named 'key'; select a segment's relationship with r.key = 'propertyValue'.
   - Use the error message verbatim for string matching.

2. Start by filtering EVENT nodes on message containment, and limit early:
   MATCH (evt:EVENT)
   WHERE evt.message CONTAINS 'the full error message'
   WITH evt
   LIMIT 1

3. Chain one MATCH per metapath segment, labelling nodes with srcKind/destKind and the relationship with relType, and assert the key right after the MATCH:
   MATCH (node1:srcKind)-[r1:relType]->(node2:destKind)
   WHERE r1.key = 'propertyValue'
   Number relationship aliases r1, r2, r3, ... in order. Reuse the same node alias whenever a node kind appears again.

4. Use labels, relationship types and property values exactly as given: 'nfs' stays 'nfs', 'involvedObject_uid' keeps its underscore. Case matters.

5. Filter immediately after each MATCH instead of at the end of the query.

6. RETURN every matched node and relationship, in path order.

Example (ConfigMap not found):

Metapath:
HasEvent, Event, EVENT, metadata_uid;
ReferInternal, Event, Pod, involvedObject_uid;
ReferInternal, Pod, ConfigMap, spec_volumes_configMap_name;

Error message:
MountVolume.SetUp failed for volume "gen-white-list-conf" : configmap "es-gen-white-list-configmap" not found

Query:
MATCH (evt:EVENT)
WHERE evt.message CONTAINS 'MountVolume.SetUp failed for volume "gen-white-list-conf" : configmap "es-gen-white-list-configmap" not found'
WITH evt
LIMIT 1
MATCH (event:Event)-[r1:HasEvent]->(evt)
WHERE r1.key = 'metadata_uid'
MATCH (event)-[r2:ReferInternal]->(pod:Pod)
WHERE r2.key = 'involvedObject_uid'
MATCH (pod)-[r3:ReferInternal]->(configMap:ConfigMap)
WHERE r3.key = 'spec_volumes_configMap_name'
RETURN event, r1, evt, r2, pod, r3, configMap
"#;

pub fn generation_prompt(metapath: &Metapath, message: &str) -> String {
    format!(
        "Let's use generation-template-1 and generate a cypher query for the following example. \
         Strictly follow the (srcKind)-[rel]->(destkind) ordering, don't reverse it. \
         Return the generated query in the following format:\n\
         ```cypher\ngenerated_cypher_query\n```\n\
         the provided metapath is:\n{metapath}\
         the error message to filtering is:\n{message}\n"
    )
}

/// Correction request after the generated query failed to execute.
pub fn repair_message(syntax: bool, error: &str) -> String {
    let heading = if syntax {
        "Cypher Syntax Error occurred"
    } else {
        "An unexpected error occurred"
    };
    format!(
        "The previous generated cypher query encounters the following exception:\n\
         {heading}: {error}\n\
         Based on the exception details above, please generate a corrected version of the Cypher query."
    )
}

// ============================================================================
// State semantic analyzer
// ============================================================================

pub const ANALYZER_NAME: &str = "k8s-state-semantic-analyzer";

pub const ANALYZER_INSTRUCTIONS: &str = "You are an expert in k8s, and can find the mistakes in \
the state, and can further determine whether the mistakes is related to the error message";

pub const STATE_RULE: &str = "In a Kubernetes system, each entity should have a corresponding \
STATE node which represents its existence and status. An entity without a STATE node is a clear \
error: the entity does not exist or its creation failed. This holds for every kind of entity, \
including nfs directories, Secrets and ConfigMaps.";

pub const TASK_PROMPT: &str = "You will receive two pieces of information:
1. A JSON string with the current state of a Kubernetes object (for example a PersistentVolume).
2. An error message that may or may not be associated with that object.

Parse the JSON and examine the object's details, focusing on the 'spec' and 'status' fields, or \
on other significant fields when those are absent. Decide whether any field shows a \
misconfiguration or error matching the nature of the error message. If the message relates to \
the JSON, explain the connection and point at the anomalies; if it does not, say so. Finish with a \
summary of the issues found.";

pub fn semantic_prompt(kind: &str, message: &str, fields: &str) -> String {
    format!(
        "The following JSON comes from a {kind} object. Focus on the 'spec' and 'status' fields \
         (or other relevant fields if 'spec' and 'status' are not present) to find some clues for \
         the following error message, and ignore the resolution for this error.\n\
         The error message is:\n{message}\n\n\
         The JSON is:\n{fields}\n"
    )
}

/// Clue recorded for an entity that has no state at the event time.
pub fn absence_clue(kind: &str, id: &str, name: &str) -> String {
    format!(
        "{kind} ({id}): there is not a STATE ({upper}) node corresponds to the Entity ({kind}) \
         node, which is an apparent error. we confirm that {name} does not exist.",
        upper = kind.to_uppercase()
    )
}

pub fn summary_prompt(kinds: &[String]) -> String {
    format!(
        "Based on the previous analysis of {kinds}, summarize the root cause of the error message, \
         and pinpoint the most relevant parts. For each kind, provide a score (0~10/10) to indicate \
         how relevant it is to the error message. Moreover, provide a resolution for the error with \
         kubectl or bash command if applicable. Include crucial details such as resource names, IDs \
         and numbers that are pertinent to understanding the cause. The kubectl/bash command should \
         use the actual resource names and namespaces.\n\
         The report needs to be formatted in a ```json block in the following style:\n\
         {{\n\
         \x20   \"summary\": [\n\
         \x20       {{\n\
         \x20           \"kind\": \"<k8s object kind>\",\n\
         \x20           \"explanation\": \"<brief explanation, with specific evidence if applicable>\",\n\
         \x20           \"relevance_score\": \"<relevance_score>\"\n\
         \x20       }}\n\
         \x20   ],\n\
         \x20   \"conclusion\": \"<summary of the overall findings>\",\n\
         \x20   \"resolution\": \"<actions to resolve the error, with kubectl/bash command>\"\n\
         }}\n",
        kinds = kinds.join(", ")
    )
}

pub fn summary_json_correction(error: &str) -> String {
    format!(
        "The previous report could not be parsed:\nJSON Error occurred: {error}\n\
         make sure to return the report in JSON format, and put it in ```json <report> ```"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_prompt_lists_catalog() {
        let catalog = KindCatalog {
            native: vec!["ConfigMap".into(), "Pod".into()],
            external: vec!["nfs".into()],
        };
        let prompt = locator_prompt(&catalog, "Pod", "volume not found");
        assert!(prompt.starts_with(
            "The predefined k8s API resource kinds and external resource kinds are the following:\n\n\
             k8s-api-resource-kinds: ConfigMap, Pod\n\nk8s-external-resource-kinds: nfs\n\n"
        ));
        assert!(prompt.contains("\"SourceKind\": \"Pod\""));
        assert!(prompt.ends_with("volume not found\n"));
    }

    #[test]
    fn test_repair_message_wording() {
        assert!(repair_message(true, "Invalid input 'MATC'")
            .contains("Cypher Syntax Error occurred: Invalid input 'MATC'"));
        assert!(repair_message(false, "boom").contains("An unexpected error occurred: boom"));
    }

    #[test]
    fn test_absence_clue() {
        assert_eq!(
            absence_clue("nfs", "42", "/mnt/data"),
            "nfs (42): there is not a STATE (NFS) node corresponds to the Entity (nfs) node, \
             which is an apparent error. we confirm that /mnt/data does not exist."
        );
    }
}
