pub fn generation_prompt(prompt: &str) -> String {
    format!(
        "You are an image generation assistant. Produce the most fitting image for the request \
without asking clarifying questions; infer the likely intent when the request is vague.

Hard rule: the image must contain no text at all. Never render words, letters or characters \
from the request, even stylised or partial. If the request mentions signs, books or other \
text-bearing objects, draw the object without legible writing.

Choose lighting, perspective, composition, style and palette that suit the subject. Keep the \
result high quality with clear visual hierarchy.

Query: {prompt}
"
    )
}

pub fn transformation_prompt(prompt: &str) -> String {
    format!(
        "You are an image editing assistant. Edit the provided image according to these instructions:

EDIT REQUEST: {prompt}

Requirements:
1. Make substantial, clearly visible changes as requested
2. Keep the image high quality and coherent
3. Blend edited elements naturally with the rest of the image
4. Do not add any text to the image
5. Preserve everything the request does not ask to change"
    )
}

pub fn translation_prompt(prompt: &str) -> String {
    format!(
        "Translate the following prompt into English if it is not already in English. Preserve \
the exact intent, every detail, the tone and any technical terms. Do not add, remove or \
reinterpret anything. If the text is already English, return it unchanged.

Original prompt: {prompt}

Return only the English prompt, nothing else."
    )
}

pub fn filename_prompt(prompt: &str) -> String {
    format!(
        "Based on this image description: \"{prompt}\"

Generate a short, descriptive file name for the image.
- at most 5 words
- underscores between words
- no file extension
Return only the file name, nothing else."
    )
}
