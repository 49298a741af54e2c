//! GLSL sources for the two programs. Uniform names match the writes
//! produced by `modelscope_core::uniforms`.

pub const PBR_ATTRIBUTES: [&str; 3] = ["aVertexPosition", "aVertexNormal", "aTextureCoord"];
pub const LINE_ATTRIBUTES: [&str; 2] = ["aPosition", "aColor"];

pub const PBR_VERTEX: &str = r#"
attribute vec3 aVertexPosition;
attribute vec3 aVertexNormal;
attribute vec2 aTextureCoord;

uniform mat4 uModelMatrix;
uniform mat4 uViewMatrix;
uniform mat4 uProjectionMatrix;
uniform mat4 uNormalMatrix;

varying vec3 vWorldPos;
varying vec3 vNormal;
varying vec2 vTexCoord;

void main() {
    vec4 world = uModelMatrix * vec4(aVertexPosition, 1.0);
    vWorldPos = world.xyz;
    vNormal = (uNormalMatrix * vec4(aVertexNormal, 0.0)).xyz;
    vTexCoord = aTextureCoord;
    gl_Position = uProjectionMatrix * uViewMatrix * world;
}
"#;

/// Cook-Torrance with a GGX distribution, one directional and one point
/// light. The base color comes from the bound texture.
pub const PBR_FRAGMENT: &str = r#"
precision mediump float;

struct Material {
    vec3 albedo;
    float metallic;
    float roughness;
    float ao;
};

struct DirLight {
    vec3 direction;
    vec3 color;
};

struct PointLight {
    vec3 position;
    vec3 color;
};

uniform Material material;
uniform DirLight dirLight;
uniform PointLight pointLight;
uniform sampler2D sampler;
uniform vec3 camPos;

varying vec3 vWorldPos;
varying vec3 vNormal;
varying vec2 vTexCoord;

const float PI = 3.14159265359;

float distributionGGX(vec3 N, vec3 H, float roughness) {
    float a = roughness * roughness;
    float a2 = a * a;
    float NdotH = max(dot(N, H), 0.0);
    float denom = NdotH * NdotH * (a2 - 1.0) + 1.0;
    return a2 / max(PI * denom * denom, 0.0001);
}

float geometrySchlickGGX(float NdotV, float roughness) {
    float r = roughness + 1.0;
    float k = r * r / 8.0;
    return NdotV / (NdotV * (1.0 - k) + k);
}

float geometrySmith(vec3 N, vec3 V, vec3 L, float roughness) {
    return geometrySchlickGGX(max(dot(N, V), 0.0), roughness)
         * geometrySchlickGGX(max(dot(N, L), 0.0), roughness);
}

vec3 fresnelSchlick(float cosTheta, vec3 F0) {
    return F0 + (1.0 - F0) * pow(clamp(1.0 - cosTheta, 0.0, 1.0), 5.0);
}

vec3 reflectance(vec3 N, vec3 V, vec3 L, vec3 radiance, vec3 albedo) {
    vec3 H = normalize(V + L);
    vec3 F0 = mix(vec3(0.04), albedo, material.metallic);
    vec3 F = fresnelSchlick(max(dot(H, V), 0.0), F0);

    float NDF = distributionGGX(N, H, material.roughness);
    float G = geometrySmith(N, V, L, material.roughness);
    vec3 specular = NDF * G * F / (4.0 * max(dot(N, V), 0.0) * max(dot(N, L), 0.0) + 0.0001);

    vec3 kD = (vec3(1.0) - F) * (1.0 - material.metallic);
    float NdotL = max(dot(N, L), 0.0);
    return (kD * albedo / PI + specular) * radiance * NdotL;
}

void main() {
    vec4 texel = texture2D(sampler, vTexCoord);
    vec3 albedo = texel.rgb;

    vec3 N = normalize(vNormal);
    vec3 V = normalize(camPos - vWorldPos);

    vec3 Lo = reflectance(N, V, normalize(-dirLight.direction), dirLight.color * PI, albedo);

    vec3 toLight = pointLight.position - vWorldPos;
    float dist = length(toLight);
    vec3 radiance = pointLight.color * PI / max(dist * dist, 0.0001);
    Lo += reflectance(N, V, normalize(toLight), radiance, albedo);

    vec3 color = vec3(material.ao) * albedo + Lo;
    color = color / (color + vec3(1.0));
    color = pow(color, vec3(1.0 / 2.2));

    gl_FragColor = vec4(color, texel.a);
}
"#;

pub const LINE_VERTEX: &str = r#"
attribute vec3 aPosition;
attribute vec3 aColor;

uniform mat4 uModel;
uniform mat4 uView;
uniform mat4 uProjection;
uniform vec3 uScale;

varying vec3 vColor;

void main() {
    vColor = aColor;
    gl_Position = uProjection * uView * uModel * vec4(aPosition * uScale, 1.0);
}
"#;

pub const LINE_FRAGMENT: &str = r#"
precision mediump float;

varying vec3 vColor;

void main() {
    gl_FragColor = vec4(vColor, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use modelscope_core::uniforms::{group_writes, ParameterGroup};
    use modelscope_core::{SceneParameters, ShaderProgram};

    /// `dirLight.color` is declared as the `color` member of `DirLight`.
    fn declares(source: &str, name: &str) -> bool {
        let member = name.rsplit('.').next().unwrap_or(name);
        source.contains(&format!(" {};", member))
    }

    #[test]
    fn test_every_uniform_write_is_declared() {
        let params = SceneParameters::default();
        for group in ParameterGroup::ALL {
            for write in group_writes(group, &params, 1e-12) {
                let sources = match write.program {
                    ShaderProgram::Pbr => [PBR_VERTEX, PBR_FRAGMENT],
                    ShaderProgram::Lines => [LINE_VERTEX, LINE_FRAGMENT],
                };
                assert!(
                    sources.iter().any(|s| declares(s, write.name)),
                    "{} not declared in {:?} shaders",
                    write.name,
                    write.program
                );
            }
        }
    }

    #[test]
    fn test_guide_uniforms_are_declared() {
        assert!(declares(LINE_VERTEX, "uModel"));
        assert!(declares(LINE_VERTEX, "uScale"));
    }

    #[test]
    fn test_attributes_are_declared() {
        for name in PBR_ATTRIBUTES {
            assert!(PBR_VERTEX.contains(&format!(" {};", name)), "{}", name);
        }
        for name in LINE_ATTRIBUTES {
            assert!(LINE_VERTEX.contains(&format!(" {};", name)), "{}", name);
        }
    }
}
